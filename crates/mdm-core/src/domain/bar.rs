use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetClass, AssetId, Interval, UtcDateTime, ValidationError};

/// Decimal places stored for prices.
pub const PRICE_SCALE: u32 = 6;
/// Decimal places stored for volume.
pub const VOLUME_SCALE: u32 = 8;

// DECIMAL(18,6) leaves 12 integer digits.
const MAX_PRICE_INTEGER_DIGITS: u32 = 12;

/// Open/high/low/close/volume values for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_close: Option<Decimal>,
}

impl Ohlcv {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: None,
        }
    }

    pub fn with_adjusted_close(mut self, adjusted_close: Decimal) -> Self {
        self.adjusted_close = Some(adjusted_close);
        self
    }

    /// Check price ordering, sign and precision for a bar of `class`.
    pub fn validate(&self, class: AssetClass) -> Result<(), ValidationError> {
        check_price("open", self.open)?;
        check_price("high", self.high)?;
        check_price("low", self.low)?;
        check_price("close", self.close)?;
        check_scale("volume", self.volume, VOLUME_SCALE)?;

        if self.volume.is_sign_negative() && !self.volume.is_zero() {
            return Err(ValidationError::NegativeValue { field: "volume" });
        }

        let body_top = self.open.max(self.close);
        let body_bottom = self.open.min(self.close);
        if self.high < body_top {
            return Err(ValidationError::HighBelowBody);
        }
        if self.low > body_bottom {
            return Err(ValidationError::LowAboveBody);
        }
        if body_top.is_sign_negative() && !body_top.is_zero() {
            return Err(ValidationError::NegativeValue { field: "close" });
        }

        if let Some(adjusted_close) = self.adjusted_close {
            if class != AssetClass::Equity {
                return Err(ValidationError::UnsupportedBarField {
                    field: "adjusted_close",
                    class: class.as_str().to_owned(),
                });
            }
            check_price("adjusted_close", adjusted_close)?;
            if adjusted_close.is_sign_negative() && !adjusted_close.is_zero() {
                return Err(ValidationError::NegativeValue {
                    field: "adjusted_close",
                });
            }
        }

        Ok(())
    }
}

/// One input row of a batch: a timestamp plus its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRow {
    pub ts: UtcDateTime,
    #[serde(flatten)]
    pub values: Ohlcv,
}

impl BarRow {
    pub fn new(ts: UtcDateTime, values: Ohlcv) -> Self {
        Self { ts, values }
    }
}

/// A stored bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub asset_id: AssetId,
    pub interval: Interval,
    pub ts: UtcDateTime,
    #[serde(flatten)]
    pub values: Ohlcv,
}

impl Bar {
    /// Build a bar, validating its values and its slot on the interval grid.
    pub fn new(
        class: AssetClass,
        asset_id: AssetId,
        interval: Interval,
        ts: UtcDateTime,
        values: Ohlcv,
    ) -> Result<Self, ValidationError> {
        interval.ensure_aligned(ts)?;
        values.validate(class)?;
        Ok(Self {
            asset_id,
            interval,
            ts,
            values,
        })
    }
}

fn check_price(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    check_scale(field, value, PRICE_SCALE)?;
    let integer_digits = value.abs().trunc().to_string().trim_start_matches('0').len() as u32;
    if integer_digits > MAX_PRICE_INTEGER_DIGITS {
        return Err(ValidationError::PrecisionExceeded {
            field,
            max_scale: PRICE_SCALE,
        });
    }
    Ok(())
}

fn check_scale(field: &'static str, value: Decimal, max_scale: u32) -> Result<(), ValidationError> {
    if value.normalize().scale() > max_scale {
        return Err(ValidationError::PrecisionExceeded { field, max_scale });
    }
    Ok(())
}
