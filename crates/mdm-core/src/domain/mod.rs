//! # Domain Models
//!
//! Strongly-typed registry and bar values. Every type validates its
//! invariants at construction, so the warehouse only ever stores values
//! that already passed these checks.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker symbol |
//! | [`AssetClass`] | Instrument category (equity, crypto, commodity future) |
//! | [`AssetMetadata`] | Class-tagged reference data |
//! | [`AssetPatch`] | Partial asset update |
//! | [`Interval`] | Bar interval (1m, 5m, 15m, 1h, 1d) |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`TimeRange`] | Inclusive query window |
//! | [`Ohlcv`] | Bar values |
//! | [`Bar`] | Stored bar keyed by asset, interval and timestamp |
//!
//! ```rust,ignore
//! use mdm_core::{AssetClass, Ohlcv, ValidationError};
//! use rust_decimal_macros::dec;
//!
//! let values = Ohlcv::new(dec!(100), dec!(103), dec!(99), dec!(104), dec!(1000));
//! assert_eq!(values.validate(AssetClass::Equity), Err(ValidationError::HighBelowBody));
//! ```

mod asset;
mod bar;
mod interval;
mod symbol;
mod timestamp;

pub use asset::{
    validate_currency_code, validate_display_name, Asset, AssetClass, AssetId, AssetKey,
    AssetMetadata, AssetPatch, CryptoMeta, CryptoPatch, EquityMeta, EquityPatch, FutureMeta,
    FuturePatch, MetadataPatch,
};
pub use bar::{Bar, BarRow, Ohlcv, PRICE_SCALE, VOLUME_SCALE};
pub use interval::Interval;
pub use symbol::{Symbol, MAX_SYMBOL_LEN};
pub use timestamp::{TimeRange, UtcDateTime};
