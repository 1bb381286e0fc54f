//! Centralized HTTP error taxonomy (spec.md §7), adapted from the
//! `ApiError` + `IntoResponse` shape in Mira's `src/api/error.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
    pub error_code: &'static str,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self { message: message.into(), status_code: StatusCode::BAD_REQUEST, error_code: "VALIDATION", retry_after_secs: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { message: message.into(), status_code: StatusCode::NOT_FOUND, error_code: "NOT_FOUND", retry_after_secs: None }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self { message: message.into(), status_code: StatusCode::CONFLICT, error_code: "DUPLICATE", retry_after_secs: None }
    }

    pub fn busy(retry_after_secs: u64) -> Self {
        Self {
            message: "too many debates in flight, try again shortly".to_string(),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
            error_code: "BUSY",
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self { message: message.into(), status_code: StatusCode::BAD_GATEWAY, error_code: "BACKEND", retry_after_secs: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { message: message.into(), status_code: StatusCode::INTERNAL_SERVER_ERROR, error_code: "INTERNAL", retry_after_secs: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            error!(code = self.error_code, "{}", self.message);
        }
        let body = json!({
            "error": true,
            "message": self.message,
            "code": self.error_code,
        });
        let mut response = (self.status_code, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert("Retry-After", secs.to_string().parse().expect("digits are valid header values"));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<crate::trace::TraceError> for ApiError {
    fn from(e: crate::trace::TraceError) -> Self {
        use crate::trace::TraceError;
        match e {
            TraceError::NotFound(id) => ApiError::not_found(format!("trace {id} not found")),
            TraceError::Duplicate(id) => ApiError::duplicate(format!("trace {id} already exists")),
            TraceError::InvalidRating(r) => ApiError::validation(format!("rating {r} must be in 1..=10")),
            TraceError::InvariantViolation(msg) => ApiError::internal(msg),
            TraceError::Store(err) => ApiError::internal(err.to_string()),
        }
    }
}

impl From<crate::broker::BrokerError> for ApiError {
    fn from(e: crate::broker::BrokerError) -> Self {
        use crate::broker::BrokerError;
        match e {
            BrokerError::NotFound(id) => ApiError::not_found(format!("debate {id} not found")),
            BrokerError::Duplicate(id) => ApiError::duplicate(format!("debate {id} already registered")),
        }
    }
}

impl From<crate::inference::InferenceError> for ApiError {
    fn from(e: crate::inference::InferenceError) -> Self {
        ApiError::backend(e.to_string())
    }
}
