use std::fmt;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderError;

/// Error codes shared by the server response body and the client controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidEmail,
    InvalidSchool,
    InvalidContentType,
    DuplicateEmail,
    RateLimited,
    MissingConfig,
    NetworkError,
    ApiError,
    MethodNotAllowed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidEmail => "INVALID_EMAIL",
            ErrorKind::InvalidSchool => "INVALID_SCHOOL",
            ErrorKind::InvalidContentType => "INVALID_CONTENT_TYPE",
            ErrorKind::DuplicateEmail => "DUPLICATE_EMAIL",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::MissingConfig => "MISSING_CONFIG",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::MethodNotAllowed => "METHOD_NOT_ALLOWED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidEmail
            | ErrorKind::InvalidSchool
            | ErrorKind::InvalidContentType
            | ErrorKind::DuplicateEmail => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::MissingConfig | ErrorKind::NetworkError | ErrorKind::ApiError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure outcome of one signup request. `Display` is the client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignupError {
    #[error("Please provide a valid email address")]
    InvalidEmail,
    #[error("School name must be 100 characters or fewer")]
    InvalidSchool,
    #[error("Request body must be JSON")]
    InvalidContentType,
    #[error("This email is already on the waitlist")]
    DuplicateEmail,
    #[error("Too many signup attempts, please try again later")]
    RateLimited { retry_after_secs: u64 },
    #[error("Signup is temporarily unavailable")]
    MissingConfig,
    #[error("Could not reach the signup service, please try again")]
    NetworkError,
    #[error("Signup failed, please try again later")]
    ApiError,
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl SignupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignupError::InvalidEmail => ErrorKind::InvalidEmail,
            SignupError::InvalidSchool => ErrorKind::InvalidSchool,
            SignupError::InvalidContentType => ErrorKind::InvalidContentType,
            SignupError::DuplicateEmail => ErrorKind::DuplicateEmail,
            SignupError::RateLimited { .. } => ErrorKind::RateLimited,
            SignupError::MissingConfig => ErrorKind::MissingConfig,
            SignupError::NetworkError => ErrorKind::NetworkError,
            SignupError::ApiError => ErrorKind::ApiError,
            SignupError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
        }
    }
}

const DEFAULT_PROVIDER_RETRY_SECS: u64 = 60;

impl From<ProviderError> for SignupError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout | ProviderError::Connect(_) => SignupError::NetworkError,
            ProviderError::RateLimited { retry_after_secs } => SignupError::RateLimited {
                retry_after_secs: retry_after_secs.unwrap_or(DEFAULT_PROVIDER_RETRY_SECS),
            },
            ProviderError::Duplicate => SignupError::DuplicateEmail,
            ProviderError::Rejected { .. }
            | ProviderError::UnexpectedBody(_)
            | ProviderError::Transport(_) => SignupError::ApiError,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl IntoResponse for SignupError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorBody {
            error: kind,
            message: self.to_string(),
        };
        let mut res = (kind.status(), Json(body)).into_response();

        match self {
            SignupError::RateLimited { retry_after_secs } => {
                res.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs.max(1)),
                );
            }
            SignupError::MethodNotAllowed => {
                res.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
            }
            _ => {}
        }
        res
    }
}
