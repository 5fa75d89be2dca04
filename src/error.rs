//! ==============================================================================
//! error.rs - failures at the http boundary
//! ==============================================================================
//!
//! purpose:
//!     one error type for every handler. each variant owns its status code
//!     and json body, so handlers just return `Result<_, RelayError>`.
//!
//! ```text
//!     Validation -> 400 {error}
//!     NotFound   -> 404 {error}
//!     Internal   -> 500 {error: "Internal server error", message}
//! ```
//!
//! relationships:
//!     - raised by: ingest.rs, service.rs, export.rs
//!     - rendered by: routes.rs (IntoResponse, panic handler)
//!
//! ==============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced at the HTTP boundary
#[derive(Error, Debug)]
pub enum RelayError {
    /// Submission or query rejected before touching the store
    #[error("{0}")]
    Validation(String),

    /// Nothing to return yet
    #[error("{0}")]
    NotFound(String),

    /// Anything unexpected while handling a request
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            RelayError::Validation(msg) | RelayError::NotFound(msg) => json!({ "error": msg }),
            RelayError::Internal(e) => {
                tracing::error!("[HTTP] Internal error: {:#}", e);
                json!({
                    "error": "Internal server error",
                    "message": format!("{:#}", e),
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        let internal: RelayError = anyhow::anyhow!("boom").into();
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
