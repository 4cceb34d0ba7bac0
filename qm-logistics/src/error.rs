//! Error types for qm-logistics
//!
//! Every user-visible failure names the constraint that was violated.

use crate::services::bulk::BatchOutcome;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Domain and API error type
#[derive(Debug, Error)]
pub enum LogisticsError {
    /// Non-positive or non-integer quantity (400)
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdraw exceeds the owner's recorded quantity (409)
    #[error("cannot withdraw {requested} of {item}: only {held} on record")]
    InsufficientStock {
        item: String,
        requested: i64,
        held: i64,
    },

    /// Uniqueness conflict (409)
    #[error("{kind} '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    /// Referenced entity absent (404)
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Malformed request other than an amount (400)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Bulk update where some lines failed; the rest were applied (207)
    #[error("{} line(s) could not be applied, {} applied", .0.failures.len(), .0.applied.len())]
    PartialBatchFailure(BatchOutcome),

    /// Storage or transport transient failure (503)
    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    /// Internal error (500)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for logistics operations
pub type Result<T> = std::result::Result<T, LogisticsError>;

impl LogisticsError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        LogisticsError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        LogisticsError::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LogisticsError::InvalidAmount(_) => "INVALID_AMOUNT",
            LogisticsError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LogisticsError::DuplicateName { .. } => "DUPLICATE_NAME",
            LogisticsError::NotFound { .. } => "NOT_FOUND",
            LogisticsError::InvalidInput(_) => "INVALID_INPUT",
            LogisticsError::PartialBatchFailure(_) => "PARTIAL_BATCH_FAILURE",
            LogisticsError::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            LogisticsError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LogisticsError::InvalidAmount(_) | LogisticsError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            LogisticsError::NotFound { .. } => StatusCode::NOT_FOUND,
            LogisticsError::InsufficientStock { .. } | LogisticsError::DuplicateName { .. } => {
                StatusCode::CONFLICT
            }
            LogisticsError::PartialBatchFailure(_) => StatusCode::MULTI_STATUS,
            LogisticsError::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LogisticsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body shared by direct replies and follow-up tickets
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });

        if let LogisticsError::PartialBatchFailure(outcome) = self {
            body["applied"] = json!(outcome.applied);
            body["failures"] = json!(outcome.failures);
        }

        body
    }
}

impl From<sqlx::Error> for LogisticsError {
    fn from(err: sqlx::Error) -> Self {
        error!("Storage failure: {}", err);
        LogisticsError::ExternalUnavailable(format!("storage: {}", err))
    }
}

impl From<qm_common::Error> for LogisticsError {
    fn from(err: qm_common::Error) -> Self {
        match err {
            qm_common::Error::Database(e) => e.into(),
            unknown @ qm_common::Error::UnknownValue { .. } => {
                LogisticsError::InvalidInput(unknown.to_string())
            }
            other => LogisticsError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for LogisticsError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bulk::{AppliedLine, LineFailure};

    #[test]
    fn test_insufficient_stock_message_names_the_constraint() {
        let err = LogisticsError::InsufficientStock {
            item: "Polaris Bit".to_string(),
            requested: 3,
            held: 1,
        };
        assert_eq!(
            err.to_string(),
            "cannot withdraw 3 of Polaris Bit: only 1 on record"
        );
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_partial_batch_body_lists_lines() {
        let err = LogisticsError::PartialBatchFailure(BatchOutcome {
            applied: vec![AppliedLine {
                line_number: 1,
                item: "Scrap".to_string(),
                quantity: 500,
            }],
            failures: vec![LineFailure {
                line_number: 2,
                line: "Gold: lots".to_string(),
                reason: "'lots' is not a whole number".to_string(),
            }],
        });

        assert_eq!(err.status(), StatusCode::MULTI_STATUS);
        assert_eq!(err.to_string(), "1 line(s) could not be applied, 1 applied");

        let body = err.to_body();
        assert_eq!(body["error"]["code"], "PARTIAL_BATCH_FAILURE");
        assert_eq!(body["applied"][0]["item"], "Scrap");
        assert_eq!(body["failures"][0]["line_number"], 2);
    }

    #[test]
    fn test_storage_errors_map_to_unavailable() {
        let err: LogisticsError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().starts_with("external service unavailable"));
    }
}
