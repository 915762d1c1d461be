use crate::domain::NormalizeError;
use crate::import::{ImportError, ImportFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Business outcome of a ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{reason}")]
    Import { inserted: u64, reason: ImportError },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Internal(err.to_string())
    }
}

impl From<NormalizeError> for LedgerError {
    fn from(err: NormalizeError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

impl From<ImportFailure> for LedgerError {
    fn from(failure: ImportFailure) -> Self {
        LedgerError::Import {
            inserted: failure.inserted,
            reason: failure.reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Import failed: {message}")]
    Import { inserted: u64, message: String },
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => AppError::BadRequest(msg),
            LedgerError::NotFound(msg) => AppError::NotFound(msg),
            LedgerError::Conflict(msg) => AppError::Conflict(msg),
            LedgerError::Import { inserted, reason } => AppError::Import {
                inserted,
                message: reason.to_string(),
            },
            LedgerError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Import { inserted, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "inserted": inserted }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_map_to_status_codes() {
        let cases = [
            (LedgerError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                LedgerError::NotFound("Position not found".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                LedgerError::Conflict("Position not flat".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                LedgerError::Import {
                    inserted: 2,
                    reason: ImportError::NoData,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::Internal("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_import_failure_keeps_partial_count() {
        let err = LedgerError::from(ImportFailure::new(4, ImportError::Empty));
        match err {
            LedgerError::Import { inserted, reason } => {
                assert_eq!(inserted, 4);
                assert_eq!(reason, ImportError::Empty);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
