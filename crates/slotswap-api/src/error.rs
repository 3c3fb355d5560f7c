use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use slotswap_gateway::chat::ChatError;

/// Failures of the swap lifecycle operations.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Everything an HTTP handler can fail with. Rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Swap(e) => match e {
                SwapError::Validation(_) => StatusCode::BAD_REQUEST,
                SwapError::Permission(_) => StatusCode::FORBIDDEN,
                SwapError::Conflict(_) => StatusCode::CONFLICT,
                SwapError::NotFound(_) => StatusCode::NOT_FOUND,
                SwapError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Chat(e) => match e {
                ChatError::Empty | ChatError::TooLong | ChatError::SelfChat => StatusCode::BAD_REQUEST,
                ChatError::UnknownUser(_) => StatusCode::NOT_FOUND,
                ChatError::NotAllowed(_) => StatusCode::FORBIDDEN,
                ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
