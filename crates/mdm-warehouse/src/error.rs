//! Error types for each warehouse layer and the facade taxonomy they fold into.

use std::fmt::{Display, Formatter};

use mdm_core::{AssetClass, AssetId, AssetKey, Interval, Symbol, UtcDateTime, ValidationError};
use serde::Serialize;
use thiserror::Error;

/// Low-level store failure.
#[derive(Debug, Error)]
pub enum StoreFault {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error while preparing the database location.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no connection became available within {waited_ms}ms (pool size {pool_size})")]
    PoolTimeout { waited_ms: u64, pool_size: usize },

    #[error("statement exceeded its {timeout_ms}ms budget and was rolled back")]
    StatementTimeout { timeout_ms: u64 },

    /// A stored row could not be decoded.
    #[error("unreadable row in '{table}': {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreFault {
    /// Timeouts and optimistic-concurrency conflicts; safe to retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PoolTimeout { .. } | Self::StatementTimeout { .. } => true,
            Self::DuckDb(error) => {
                let message = error.to_string().to_ascii_lowercase();
                message.contains("conflict") || message.contains("write-write")
            }
            _ => false,
        }
    }

    /// Uniqueness or other declared constraint violated.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::DuckDb(error) => {
                let message = error.to_string().to_ascii_lowercase();
                message.contains("duplicate key") || message.contains("constraint")
            }
            _ => false,
        }
    }
}

/// Errors raised by the schema manager.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table '{table}' does not match its descriptor: {detail}")]
    Incompatible { table: &'static str, detail: String },

    #[error(transparent)]
    Store(#[from] StoreFault),
}

impl From<::duckdb::Error> for SchemaError {
    fn from(error: ::duckdb::Error) -> Self {
        Self::Store(StoreFault::DuckDb(error))
    }
}

/// Errors raised by the asset registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid asset input for {subject}: {source}")]
    InvalidMetadata {
        subject: String,
        #[source]
        source: ValidationError,
    },

    #[error("asset {symbol}/{class} already exists")]
    DuplicateAsset { symbol: Symbol, class: AssetClass },

    #[error("asset {key} not found")]
    NotFound { key: AssetKey },

    #[error("asset_id={asset_id}: {source}")]
    ImmutableClass {
        asset_id: AssetId,
        #[source]
        source: ValidationError,
    },

    #[error("asset_id={asset_id} still has {bar_count} bars; delete with cascade to remove them")]
    HasDependentBars { asset_id: AssetId, bar_count: u64 },

    #[error(transparent)]
    Store(#[from] StoreFault),
}

impl From<::duckdb::Error> for RegistryError {
    fn from(error: ::duckdb::Error) -> Self {
        Self::Store(StoreFault::DuckDb(error))
    }
}

/// Identity of one bar slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSlot {
    pub asset_id: AssetId,
    pub interval: Interval,
    pub ts: UtcDateTime,
}

impl Display for BarSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "asset_id={} interval={} ts={}",
            self.asset_id, self.interval, self.ts
        )
    }
}

/// Errors raised by the bar store.
#[derive(Debug, Error)]
pub enum BarError {
    #[error("invalid bar at {slot}: {source}")]
    InvalidBar {
        slot: BarSlot,
        #[source]
        source: ValidationError,
    },

    #[error("invalid range for asset_id={asset_id}: {source}")]
    InvalidRange {
        asset_id: AssetId,
        #[source]
        source: ValidationError,
    },

    #[error("asset_id={asset_id} does not exist")]
    UnknownAsset { asset_id: AssetId },

    #[error("asset_id={asset_id} is {actual}, not {expected}")]
    ClassMismatch {
        asset_id: AssetId,
        expected: AssetClass,
        actual: AssetClass,
    },

    #[error(transparent)]
    Store(#[from] StoreFault),
}

impl From<::duckdb::Error> for BarError {
    fn from(error: ::duckdb::Error) -> Self {
        Self::Store(StoreFault::DuckDb(error))
    }
}

/// Closed error taxonomy exposed by [`crate::MarketData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Referential,
    Transient,
    Schema,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "mdm.validation",
            Self::Conflict => "mdm.conflict",
            Self::NotFound => "mdm.not_found",
            Self::Referential => "mdm.referential",
            Self::Transient => "mdm.transient",
            Self::Schema => "mdm.schema",
        }
    }

    /// HTTP status class a routing layer should answer with.
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Conflict | Self::Referential => 409,
            Self::NotFound => 404,
            Self::Transient => 503,
            Self::Schema => 500,
        }
    }
}

/// Error surfaced by the facade; `subject` names the offending identity.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("[{}] {subject}: {message}", .kind.code())]
pub struct MarketDataError {
    pub kind: ErrorKind,
    pub subject: String,
    pub message: String,
}

impl MarketDataError {
    pub fn new(kind: ErrorKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub(crate) fn from_fault(subject: impl Into<String>, fault: &StoreFault) -> Self {
        let kind = if fault.is_constraint_violation() {
            ErrorKind::Conflict
        } else if matches!(
            fault,
            StoreFault::Corrupt { .. } | StoreFault::Serialization(_) | StoreFault::Io(_)
        ) {
            ErrorKind::Schema
        } else {
            ErrorKind::Transient
        };
        Self::new(kind, subject, fault.to_string())
    }
}

impl From<SchemaError> for MarketDataError {
    fn from(error: SchemaError) -> Self {
        match &error {
            SchemaError::Incompatible { table, .. } => {
                Self::new(ErrorKind::Schema, *table, error.to_string())
            }
            SchemaError::Store(fault) if fault.is_transient() => {
                Self::from_fault("schema", fault)
            }
            SchemaError::Store(fault) => Self::new(ErrorKind::Schema, "schema", fault.to_string()),
        }
    }
}

impl From<RegistryError> for MarketDataError {
    fn from(error: RegistryError) -> Self {
        let message = error.to_string();
        match error {
            RegistryError::InvalidMetadata { subject, source } => {
                Self::new(ErrorKind::Validation, subject, source.to_string())
            }
            RegistryError::DuplicateAsset { symbol, class } => {
                Self::new(ErrorKind::Conflict, format!("{symbol}/{class}"), message)
            }
            RegistryError::NotFound { key } => Self::new(ErrorKind::NotFound, key.to_string(), message),
            RegistryError::ImmutableClass { asset_id, source } => Self::new(
                ErrorKind::Validation,
                format!("asset_id={asset_id}"),
                source.to_string(),
            ),
            RegistryError::HasDependentBars { asset_id, .. } => {
                Self::new(ErrorKind::Referential, format!("asset_id={asset_id}"), message)
            }
            RegistryError::Store(fault) => Self::from_fault("assets", &fault),
        }
    }
}

impl RegistryError {
    /// Convert for the facade, naming `subject` on store faults.
    pub fn into_market_error(self, subject: impl Display) -> MarketDataError {
        match self {
            Self::Store(fault) => MarketDataError::from_fault(subject.to_string(), &fault),
            other => other.into(),
        }
    }
}

impl BarError {
    /// Convert for the facade, naming `subject` on store faults.
    pub fn into_market_error(self, subject: impl Display) -> MarketDataError {
        match self {
            Self::Store(fault) => MarketDataError::from_fault(subject.to_string(), &fault),
            other => other.into(),
        }
    }
}

impl From<BarError> for MarketDataError {
    fn from(error: BarError) -> Self {
        let message = error.to_string();
        match error {
            BarError::InvalidBar { slot, source } => {
                Self::new(ErrorKind::Validation, slot.to_string(), source.to_string())
            }
            BarError::InvalidRange { asset_id, source } => Self::new(
                ErrorKind::Validation,
                format!("asset_id={asset_id}"),
                source.to_string(),
            ),
            BarError::UnknownAsset { asset_id } | BarError::ClassMismatch { asset_id, .. } => {
                Self::new(ErrorKind::Referential, format!("asset_id={asset_id}"), message)
            }
            BarError::Store(fault) => Self::from_fault("bars", &fault),
        }
    }
}
