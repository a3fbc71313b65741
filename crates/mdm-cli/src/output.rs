use std::time::Duration;

use mdm_warehouse::MarketDataError;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeError {
    pub code: &'static str,
    pub http_status: u16,
    pub retryable: bool,
    pub subject: String,
    pub message: String,
}

impl From<&MarketDataError> for EnvelopeError {
    fn from(error: &MarketDataError) -> Self {
        Self {
            code: error.code(),
            http_status: error.http_status(),
            retryable: error.retryable(),
            subject: error.subject.clone(),
            message: error.message.clone(),
        }
    }
}

/// Response document printed for every command.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    pub fn new(outcome: &Result<Value, CliError>, elapsed: Duration) -> Self {
        let meta = EnvelopeMeta {
            request_id: Uuid::new_v4().to_string(),
            latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        match outcome {
            Ok(data) => Self {
                meta,
                data: data.clone(),
                error: None,
            },
            Err(error) => Self {
                meta,
                data: Value::Null,
                error: Some(EnvelopeError::from(&error.to_market_error())),
            },
        }
    }
}

pub fn render(envelope: &Envelope, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    println!("{payload}");
    Ok(())
}
