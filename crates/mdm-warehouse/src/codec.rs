//! Text encodings used to move timestamps and decimals through SQL.
//!
//! Values are bound as strings and cast in SQL (`CAST(? AS TIMESTAMP)`,
//! `CAST(? AS DECIMAL(18,6))`), and read back with `CAST(col AS VARCHAR)`.

use std::str::FromStr;

use rust_decimal::Decimal;
use time::macros::format_description;
use time::PrimitiveDateTime;

use mdm_core::UtcDateTime;

use crate::error::StoreFault;

/// `YYYY-MM-DD HH:MM:SS`, the form `DuckDB` prints for `TIMESTAMP`.
pub(crate) fn ts_param(ts: UtcDateTime) -> String {
    let inner = ts.into_inner();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        inner.year(),
        u8::from(inner.month()),
        inner.day(),
        inner.hour(),
        inner.minute(),
        inner.second()
    )
}

pub(crate) fn parse_ts(table: &'static str, raw: &str) -> Result<UtcDateTime, StoreFault> {
    // Stored values are whole seconds; drop any fractional suffix.
    let whole = raw.split('.').next().unwrap_or(raw);
    PrimitiveDateTime::parse(
        whole,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .map(|value| value.assume_utc())
    .map_err(|error| StoreFault::Corrupt {
        table,
        detail: format!("timestamp '{raw}': {error}"),
    })
    .and_then(|value| {
        UtcDateTime::from_offset_datetime(value).map_err(|error| StoreFault::Corrupt {
            table,
            detail: error.to_string(),
        })
    })
}

pub(crate) fn decimal_param(value: Decimal) -> String {
    value.normalize().to_string()
}

pub(crate) fn parse_decimal(
    table: &'static str,
    column: &str,
    raw: &str,
) -> Result<Decimal, StoreFault> {
    Decimal::from_str(raw.trim())
        .map(|value| value.normalize())
        .map_err(|error| StoreFault::Corrupt {
            table,
            detail: format!("{column} '{raw}': {error}"),
        })
}
