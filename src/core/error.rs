// Centralized error handling for the tracker

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Failures of a backing store (swarm registry or access lists)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl StoreError {
    /// Both variants describe transient conditions; the caller may try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout { .. })
    }
}

/// Errors that end an announce or scrape request
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("Forbidden")]
    AccessDenied,

    #[error("Too Many Requests")]
    RateLimited,

    #[error("Internal server error")]
    Backend(#[from] StoreError),
}

impl TrackerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TrackerError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            TrackerError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            TrackerError::AccessDenied => StatusCode::FORBIDDEN,
            TrackerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            TrackerError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Admin endpoints are disabled")]
    Disabled,

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        use crate::models::admin::ErrorResponse;
        use axum::response::Json;

        let status = match &self {
            AdminError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AdminError::Disabled => StatusCode::UNAUTHORIZED,
            AdminError::InvalidIpAddress(_) => StatusCode::BAD_REQUEST,
            AdminError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        AdminError::InternalError(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter format: {0}")]
    InvalidFormat(&'static str),

    #[error("Parameter out of range: {0}")]
    OutOfRange(&'static str),

    #[error("Invalid length for {field}: expected {expected}, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl From<ValidationError> for TrackerError {
    fn from(e: ValidationError) -> Self {
        TrackerError::InvalidParameter(e.to_string())
    }
}
