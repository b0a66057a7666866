//! HTTP API response types

use serde::{Deserialize, Serialize};
use tsexport::ExportError;

pub mod limits {
    /// Upper bound on a compressed remote-write body.
    pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub service: String,
    pub timestamp: u64,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(error: &str, message: &str, details: serde_json::Value) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            details: Some(details),
        }
    }

    pub fn decode_error(message: &str) -> Self {
        Self::new("decode_error", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("internal_error", message)
    }
}

impl From<&ExportError> for ErrorResponse {
    fn from(error: &ExportError) -> Self {
        let message = error.to_string();
        match error {
            ExportError::PoolExhausted { max_total } => Self::with_details(
                "pool_exhausted",
                &message,
                serde_json::json!({ "max_total": max_total }),
            ),
            ExportError::PoolTimeout { waited_ms } => Self::with_details(
                "pool_timeout",
                &message,
                serde_json::json!({ "waited_ms": waited_ms }),
            ),
            ExportError::PoolClosed => Self::new("pool_closed", &message),
            ExportError::WriterClosed { writer_id } => Self::with_details(
                "writer_closed",
                &message,
                serde_json::json!({ "writer_id": writer_id }),
            ),
            ExportError::InvalidRecord(_) => Self::new("invalid_record", &message),
            ExportError::Config { field, .. } => Self::with_details(
                "config_error",
                &message,
                serde_json::json!({ "field": field }),
            ),
            ExportError::Storage(_) => Self::new("storage_error", &message),
        }
    }
}
