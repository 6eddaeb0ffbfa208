use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use banter_types::api::{ErrorBody, FieldError};

/// The full error surface of the HTTP API. Upstream AI failures never appear
/// here — the message-send flow absorbs them into a fallback assistant reply.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request")]
    Validation(Vec<FieldError>),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message: "Invalid request".to_string(),
                    errors,
                    retry_after: None,
                },
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    message: "Authentication required".to_string(),
                    errors: vec![],
                    retry_after: None,
                },
            ),
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    message: format!("{what} not found"),
                    errors: vec![],
                    retry_after: None,
                },
            ),
            Self::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    message: "Too many requests, please slow down".to_string(),
                    errors: vec![],
                    retry_after: Some(retry_after),
                },
            ),
            Self::Internal(err) => {
                error!("internal error: {err:#}");
                let message = if cfg!(debug_assertions) {
                    format!("{err:#}")
                } else {
                    "Internal server error".to_string()
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        message,
                        errors: vec![],
                        retry_after: None,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
