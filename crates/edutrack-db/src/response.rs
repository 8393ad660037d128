//! # Response Envelope
//!
//! The shape a UI binds to: the transfer and its lines on success, or a
//! machine-readable error.
//!
//! ```json
//! {
//!   "transfer": null,
//!   "lineItems": [],
//!   "error": {
//!     "code": "DISCREPANCY_REQUIRES_NOTES",
//!     "message": "Transfer ... discrepancy notes are required"
//!   }
//! }
//! ```

use edutrack_core::{Transfer, TransferLineItem, TransferSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Error codes for engine responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidTransition,
    AuthorizationError,
    NotFound,
    DiscrepancyRequiresNotes,
    ConcurrencyConflict,
    DatabaseError,
}

/// A failed operation, serialized for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }
}

/// Database failures are logged in full but reported generically.
impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        let code = err.code();
        match err {
            EngineError::Database(db_err) if code == ErrorCode::DatabaseError => {
                tracing::error!(error = %db_err, "Database operation failed");
                ApiError::new(code, "Database operation failed")
            }
            _ => ApiError::new(code, err.to_string()),
        }
    }
}

/// Result of one engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub transfer: Option<Transfer>,
    pub line_items: Vec<TransferLineItem>,
    pub error: Option<ApiError>,
}

impl OperationResponse {
    pub fn success(snapshot: TransferSnapshot) -> Self {
        OperationResponse {
            transfer: Some(snapshot.transfer),
            line_items: snapshot.line_items,
            error: None,
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        OperationResponse {
            transfer: None,
            line_items: Vec::new(),
            error: Some(ApiError::from(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<EngineResult<TransferSnapshot>> for OperationResponse {
    fn from(result: EngineResult<TransferSnapshot>) -> Self {
        match result {
            Ok(snapshot) => OperationResponse::success(snapshot),
            Err(err) => OperationResponse::failure(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use edutrack_core::CoreError;

    #[test]
    fn test_failure_envelope() {
        let err: EngineError = CoreError::DiscrepancyRequiresNotes {
            transfer_id: "t-1".to_string(),
            line_item_ids: vec!["li-1".to_string()],
        }
        .into();
        let response = OperationResponse::from(Err(err));

        assert!(!response.is_success());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], "DISCREPANCY_REQUIRES_NOTES");
        assert!(json["transfer"].is_null());
        assert_eq!(json["lineItems"], serde_json::json!([]));
    }

    #[test]
    fn test_database_errors_are_generic() {
        let err: EngineError = DbError::QueryFailed("no such table: audit_entries".to_string()).into();
        let api = ApiError::from(&err);
        assert_eq!(api.code, ErrorCode::DatabaseError);
        assert_eq!(api.message, "Database operation failed");
    }
}
