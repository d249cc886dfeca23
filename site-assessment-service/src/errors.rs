use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::validation::ValidationError;

pub const UPSTREAM_MESSAGE: &str = "Error communicating with the AI service. Please try again later.";
pub const INTERNAL_MESSAGE: &str = "An error occurred while processing your request.";

#[derive(Error, Debug)]
pub enum AssessError {
    /// Upload rejected before any upstream call
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body could not be parsed as a multipart form
    #[error("Failed to parse multipart data: {message}")]
    BadRequest { message: String },

    /// Whole request body went over the configured limit
    #[error("Request body too large: {message}")]
    PayloadTooLarge { message: String },

    #[error("Too many requests from this IP, please try again after {window_minutes} minutes")]
    RateLimited { window_minutes: u64 },

    /// The completion service failed or answered with something unusable
    #[error("Upstream completion failed (status {status:?}): {details}")]
    Upstream { status: Option<u16>, details: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AssessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssessError::Validation(ValidationError::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AssessError::Validation(_) => StatusCode::BAD_REQUEST,
            AssessError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AssessError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AssessError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AssessError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AssessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller. Upstream and internal details stay
    /// in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AssessError::Validation(err) => err.to_string(),
            AssessError::BadRequest { .. } => "Failed to parse multipart data".to_string(),
            AssessError::PayloadTooLarge { .. } => "Request body too large.".to_string(),
            AssessError::RateLimited { .. } => self.to_string(),
            AssessError::Upstream { .. } => UPSTREAM_MESSAGE.to_string(),
            AssessError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AssessError {
    fn into_response(self) -> Response {
        match &self {
            AssessError::Upstream { status, details } => {
                tracing::error!(?status, %details, "AI service request failed");
            }
            AssessError::Internal(err) => {
                tracing::error!("Internal service error: {:#}", err);
            }
            AssessError::RateLimited { .. } => {
                tracing::warn!("{}", self);
            }
            AssessError::Validation(_)
            | AssessError::BadRequest { .. }
            | AssessError::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
