use axum::{
    extract::rejection::BytesRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::openrouter::UpstreamError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("rate limit exceeded: {limit}")]
    RateLimited { limit: String, retry_after: u64 },

    #[error("upstream connection error: {0}")]
    UpstreamConnection(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("invalid upstream response: {0}")]
    InvalidUpstreamResponse(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("not found")]
    NotFound,

    #[error("method {method} not allowed")]
    MethodNotAllowed { method: String, allowed: Vec<String> },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::MissingField(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            AppError::UpstreamConnection(_)
            | AppError::UpstreamStatus(_)
            | AppError::InvalidUpstreamResponse(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label returned in the `error` field.
    pub fn label(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "Invalid request",
            AppError::MissingField(_) => "Missing required field",
            AppError::PayloadTooLarge => "Payload Too Large",
            AppError::RateLimited { .. } => "Too Many Requests",
            AppError::UpstreamConnection(_) => "API Connection Error",
            AppError::UpstreamStatus(_) => "API Error",
            AppError::InvalidUpstreamResponse(_) => "Invalid API Response",
            AppError::Server(_) => "Server Error",
            AppError::NotFound => "Not Found",
            AppError::MethodNotAllowed { .. } => "Method Not Allowed",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let details = match self {
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::MissingField(field) => format!("The field '{}' is required", field),
            AppError::PayloadTooLarge => {
                format!("Request body exceeds the {} byte limit", crate::routes::MAX_BODY_BYTES)
            }
            AppError::RateLimited { limit, .. } => format!("Rate limit exceeded: {}", limit),
            AppError::UpstreamConnection(msg) => msg.clone(),
            AppError::UpstreamStatus(code) => format!("OpenRouter API returned status code {}", code),
            AppError::InvalidUpstreamResponse(msg) => msg.clone(),
            AppError::Server(msg) => msg.clone(),
            AppError::NotFound => "The requested resource was not found".to_string(),
            AppError::MethodNotAllowed { method, .. } => {
                format!("The {} method is not allowed for this endpoint", method)
            }
        };
        ErrorBody {
            error: self.label(),
            details,
            retry_after: match self {
                AppError::RateLimited { retry_after, .. } => Some(*retry_after),
                _ => None,
            },
            allowed_methods: match self {
                AppError::MethodNotAllowed { allowed, .. } => Some(allowed.clone()),
                _ => None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "❌ Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let mut res = (status, Json(self.body())).into_response();
        match &self {
            AppError::RateLimited { retry_after, .. } => {
                res.headers_mut().insert(header::RETRY_AFTER, (*retry_after).into());
            }
            AppError::MethodNotAllowed { allowed, .. } if !allowed.is_empty() => {
                if let Ok(value) = HeaderValue::from_str(&allowed.join(",")) {
                    res.headers_mut().insert(header::ALLOW, value);
                }
            }
            _ => {}
        }
        res
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidRequest(rejection.body_text())
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Connection(msg) => AppError::UpstreamConnection(msg),
            UpstreamError::Status(code) => AppError::UpstreamStatus(code),
            UpstreamError::InvalidResponse(msg) => AppError::InvalidUpstreamResponse(msg),
        }
    }
}
