//! Error types shared by every component.

use axum::http::StatusCode;

// ============= Error Types =============

/// Errors surfaced by the core.
///
/// Every mutating operation runs inside a single store transaction, so an
/// `Err` never leaves a partial write behind.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input: empty required field, duplicate hypothesis,
    /// self-verification, double vote, illegal status transition.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A claim or vote lost a race against a concurrent caller. Retried by
    /// the scheduler from a fresh read.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// The external agent executor failed.
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        AppError::NotFound(format!("{} '{}'", kind, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Whether the scheduler should retry the operation from a fresh scan.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Execution(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", e))
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::validation("empty"), StatusCode::BAD_REQUEST),
            (AppError::not_found("task", "t-1"), StatusCode::NOT_FOUND),
            (AppError::Conflict("lost".into()), StatusCode::CONFLICT),
            (AppError::Database("io".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::not_found("task", "abc");
        assert_eq!(err.to_string(), "Not found: task 'abc'");
        assert!(!err.is_conflict());
        assert!(AppError::Conflict("x".into()).is_conflict());
    }
}
