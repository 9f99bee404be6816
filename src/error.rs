use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            GatewayError::Query(_) => (
                StatusCode::BAD_REQUEST,
                self.to_string(),
            ),
            GatewayError::Connection(_) => (
                StatusCode::BAD_GATEWAY,
                self.to_string(),
            ),
            GatewayError::Decode(_) => (
                StatusCode::BAD_GATEWAY,
                self.to_string(),
            ),
            GatewayError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                self.to_string(),
            ),
            GatewayError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
            ),
            GatewayError::ShapeMismatch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
            ),
            GatewayError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
