//! Attribute read, update, and verification endpoints.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::workflow::{ConfirmOutcome, UpdateOutcome};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::types::{
    AttributesResponse, ConfirmAttributeRequest, ConfirmAttributeResponse, ErrorResponse,
    ResendCodeResponse, UpdateAttributeRequest, UpdateAttributeResponse, VerificationResponse,
};
use super::{ApiState, error_response, extract_client_ip, simple_error};

fn rate_limited(state: &ApiState, headers: &HeaderMap, action: RateLimitAction) -> bool {
    let client_ip = extract_client_ip(headers);
    state.rate_limiter().check_ip(client_ip.as_deref(), action) == RateLimitDecision::Limited
}

fn too_many_requests() -> Response {
    simple_error(
        StatusCode::TOO_MANY_REQUESTS,
        "rate_limited",
        "Rate limited",
    )
}

fn missing_payload() -> Response {
    simple_error(StatusCode::BAD_REQUEST, "missing_payload", "Missing payload")
}

/// Read the account's attributes from the provider.
#[utoipa::path(
    get,
    path = "/v1/attributes",
    responses(
        (status = 200, description = "Current attribute values", body = AttributesResponse),
        (status = 503, description = "Identity provider unavailable", body = ErrorResponse)
    ),
    tag = "attributes"
)]
pub async fn list_attributes(state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = match state.workflow().fetch().await {
        Ok(snapshot) => snapshot,
        Err(err) => return error_response(&err),
    };
    let pending = state.workflow().pending_attributes().await;

    (
        StatusCode::OK,
        Json(AttributesResponse {
            attributes: snapshot.values().clone(),
            pending: pending.into_iter().collect(),
        }),
    )
        .into_response()
}

/// List attributes waiting for a confirmation code.
#[utoipa::path(
    get,
    path = "/v1/verifications/pending",
    responses(
        (status = 200, description = "Attribute names with a pending verification", body = [String])
    ),
    tag = "attributes"
)]
pub async fn pending_attributes(state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let pending: Vec<String> = state
        .workflow()
        .pending_attributes()
        .await
        .into_iter()
        .collect();
    Json(pending)
}

/// Propose a new value for an attribute.
#[utoipa::path(
    put,
    path = "/v1/attributes/{name}",
    request_body = UpdateAttributeRequest,
    params(
        ("name" = String, Path, description = "Attribute name")
    ),
    responses(
        (status = 200, description = "Value applied", body = UpdateAttributeResponse),
        (status = 202, description = "Confirmation code sent", body = UpdateAttributeResponse),
        (status = 400, description = "Blank name or value", body = ErrorResponse),
        (status = 422, description = "Value rejected by the provider", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Identity provider unavailable", body = ErrorResponse)
    ),
    tag = "attributes"
)]
pub async fn update_attribute(
    headers: HeaderMap,
    Path(name): Path<String>,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<UpdateAttributeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    if rate_limited(&state, &headers, RateLimitAction::RequestUpdate) {
        return too_many_requests();
    }

    match state.workflow().request_update(&name, &request.value).await {
        Ok(UpdateOutcome::Applied) => (
            StatusCode::OK,
            Json(UpdateAttributeResponse {
                attribute: name.trim().to_string(),
                outcome: "applied".to_string(),
                delivery: None,
            }),
        )
            .into_response(),
        Ok(UpdateOutcome::ConfirmationRequired { delivery }) => (
            StatusCode::ACCEPTED,
            Json(UpdateAttributeResponse {
                attribute: name.trim().to_string(),
                outcome: "confirmation_required".to_string(),
                delivery,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Report (and consume, when terminal) the verification state of an attribute.
#[utoipa::path(
    get,
    path = "/v1/attributes/{name}/verification",
    params(
        ("name" = String, Path, description = "Attribute name")
    ),
    responses(
        (status = 200, description = "Verification state", body = VerificationResponse)
    ),
    tag = "attributes"
)]
pub async fn observe_verification(
    Path(name): Path<String>,
    state: Extension<Arc<ApiState>>,
) -> impl IntoResponse {
    let response = state
        .workflow()
        .observe(&name)
        .await
        .map_or_else(|| VerificationResponse::idle(name.trim()), Into::into);
    Json(response)
}

/// Abandon a pending verification locally. Always succeeds.
#[utoipa::path(
    delete,
    path = "/v1/attributes/{name}/verification",
    params(
        ("name" = String, Path, description = "Attribute name")
    ),
    responses(
        (status = 204, description = "Verification cancelled")
    ),
    tag = "attributes"
)]
pub async fn cancel_verification(
    Path(name): Path<String>,
    state: Extension<Arc<ApiState>>,
) -> impl IntoResponse {
    state.workflow().cancel(&name).await;
    StatusCode::NO_CONTENT
}

/// Submit the code delivered for a pending update.
#[utoipa::path(
    post,
    path = "/v1/attributes/{name}/confirm",
    request_body = ConfirmAttributeRequest,
    params(
        ("name" = String, Path, description = "Attribute name")
    ),
    responses(
        (status = 200, description = "Attribute confirmed", body = ConfirmAttributeResponse),
        (status = 400, description = "Blank name or code", body = ErrorResponse),
        (status = 404, description = "No pending confirmation", body = ErrorResponse),
        (status = 409, description = "Code belonged to a superseded update", body = ErrorResponse),
        (status = 422, description = "Invalid or expired code", body = ErrorResponse),
        (status = 429, description = "Too many attempts or rate limited", body = ErrorResponse),
        (status = 503, description = "Identity provider unavailable", body = ErrorResponse)
    ),
    tag = "attributes"
)]
pub async fn confirm_attribute(
    headers: HeaderMap,
    Path(name): Path<String>,
    state: Extension<Arc<ApiState>>,
    payload: Option<Json<ConfirmAttributeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    if rate_limited(&state, &headers, RateLimitAction::Confirm) {
        return too_many_requests();
    }

    match state.workflow().confirm(&name, &request.code).await {
        Ok(ConfirmOutcome::Confirmed { value }) => (
            StatusCode::OK,
            Json(ConfirmAttributeResponse {
                attribute: name.trim().to_string(),
                value,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Ask the provider to deliver a fresh code for a pending update.
#[utoipa::path(
    post,
    path = "/v1/attributes/{name}/resend",
    params(
        ("name" = String, Path, description = "Attribute name")
    ),
    responses(
        (status = 202, description = "Code re-sent", body = ResendCodeResponse),
        (status = 404, description = "No pending confirmation", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 503, description = "Identity provider unavailable", body = ErrorResponse)
    ),
    tag = "attributes"
)]
pub async fn resend_code(
    headers: HeaderMap,
    Path(name): Path<String>,
    state: Extension<Arc<ApiState>>,
) -> impl IntoResponse {
    if rate_limited(&state, &headers, RateLimitAction::ResendCode) {
        return too_many_requests();
    }

    match state.workflow().resend_code(&name).await {
        Ok(delivery) => (
            StatusCode::ACCEPTED,
            Json(ResendCodeResponse {
                attribute: name.trim().to_string(),
                delivery,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
