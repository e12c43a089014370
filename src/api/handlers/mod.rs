pub mod attributes;
pub mod health;
pub mod rate_limit;
pub mod types;

use crate::workflow::{AttributeWorkflow, WorkflowError};
use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use self::rate_limit::RateLimiter;
use self::types::ErrorResponse;

/// Shared handler state.
pub struct ApiState {
    workflow: Arc<AttributeWorkflow>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl ApiState {
    #[must_use]
    pub fn new(workflow: Arc<AttributeWorkflow>, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            workflow,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn workflow(&self) -> &AttributeWorkflow {
        &self.workflow
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

pub(crate) fn error_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::EmptyName | WorkflowError::EmptyValue | WorkflowError::EmptyCode => {
            StatusCode::BAD_REQUEST
        }
        WorkflowError::NoPendingConfirmation => StatusCode::NOT_FOUND,
        WorkflowError::ProviderRejected(_)
        | WorkflowError::InvalidCode
        | WorkflowError::CodeExpired => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::ConfirmationMismatch => StatusCode::CONFLICT,
        WorkflowError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        WorkflowError::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub(crate) fn error_response(err: &WorkflowError) -> Response {
    let status = error_status(err);
    if status.is_server_error() {
        error!("Attribute workflow failed: {err}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.kind().to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn simple_error(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: kind.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
