use mdm_warehouse::{ConfigError, ErrorKind, MarketDataError, StoreFault};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error(transparent)]
    Validation(#[from] mdm_core::ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open database: {0}")]
    Open(#[from] StoreFault),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Error kind reported in the envelope, when the failure has one.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Market(error) => error.kind(),
            Self::Validation(_) | Self::Config(_) | Self::Command(_) => ErrorKind::Validation,
            Self::Open(fault) if fault.is_transient() => ErrorKind::Transient,
            Self::Open(_) | Self::Serialization(_) | Self::Io(_) => ErrorKind::Schema,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Serialization(_) | Self::Io(_) => 10,
            _ => match self.kind() {
                ErrorKind::Validation => 2,
                ErrorKind::NotFound => 3,
                ErrorKind::Conflict | ErrorKind::Referential => 4,
                ErrorKind::Transient => 5,
                ErrorKind::Schema => 10,
            },
        }
    }

    /// The facade error this failure reports as.
    pub fn to_market_error(&self) -> MarketDataError {
        match self {
            Self::Market(error) => error.clone(),
            Self::Validation(_) | Self::Command(_) => {
                MarketDataError::new(self.kind(), "input", self.to_string())
            }
            Self::Config(error) => MarketDataError::new(self.kind(), error.field, error.reason.clone()),
            Self::Open(_) => MarketDataError::new(self.kind(), "database", self.to_string()),
            Self::Serialization(_) | Self::Io(_) => {
                MarketDataError::new(self.kind(), "cli", self.to_string())
            }
        }
    }
}
