use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use centime_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or missing required input.  Rejected before any side
    /// effect is attempted.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The primary persistence step failed.  Nothing else has run at that
    /// point, so there is no rollback to perform.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            ServerError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
