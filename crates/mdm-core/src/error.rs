use thiserror::Error;

/// Validation errors raised while constructing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid asset class '{value}', expected one of equity, crypto, commodity_future")]
    InvalidAssetClass { value: String },
    #[error("invalid interval '{value}', expected one of 1m, 5m, 15m, 1h, 1d")]
    InvalidInterval { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z) or YYYY-MM-DD: '{value}'")]
    TimestampNotUtc { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp {ts} is not aligned to the {interval} grid")]
    TimestampMisaligned { ts: String, interval: String },
    #[error("range start {from} is after range end {to}")]
    InvalidRange { from: String, to: String },

    #[error("currency must be a 3-letter ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' exceeds {max_scale} decimal places or the storable magnitude")]
    PrecisionExceeded { field: &'static str, max_scale: u32 },
    #[error("bar high must be >= max(open, close)")]
    HighBelowBody,
    #[error("bar low must be <= min(open, close)")]
    LowAboveBody,
    #[error("field '{field}' is not stored for {class} bars")]
    UnsupportedBarField { field: &'static str, class: String },

    #[error("{class} metadata requires '{field}'")]
    MissingField { class: String, field: &'static str },
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
    #[error("{class} metadata cannot describe a {expected} asset")]
    MetadataClassMismatch { class: String, expected: String },
    #[error("circulating supply exceeds max supply")]
    SupplyExceedsMax,

    #[error("asset class is immutable; delete and re-create the asset under the new class")]
    ImmutableClass,
    #[error("patch contains no changes")]
    EmptyPatch,
}
