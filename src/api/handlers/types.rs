//! Request/response types for attribute endpoints.

use crate::provider::CodeDelivery;
use crate::workflow::{VerificationState, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct AttributesResponse {
    pub attributes: BTreeMap<String, String>,
    pub pending: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateAttributeRequest {
    pub value: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct UpdateAttributeResponse {
    pub attribute: String,
    /// `applied` or `confirmation_required`
    pub outcome: String,
    pub delivery: Option<CodeDelivery>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmAttributeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ConfirmAttributeResponse {
    pub attribute: String,
    pub value: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ResendCodeResponse {
    pub attribute: String,
    pub delivery: Option<CodeDelivery>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct VerificationResponse {
    pub attribute: String,
    /// `idle`, `pending`, `confirmed` or `failed`
    pub status: String,
    pub proposed_value: Option<String>,
    pub failure: Option<String>,
    pub delivery: Option<CodeDelivery>,
}

impl VerificationResponse {
    #[must_use]
    pub fn idle(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            status: VerificationStatus::Idle.as_str().to_string(),
            proposed_value: None,
            failure: None,
            delivery: None,
        }
    }
}

impl From<VerificationState> for VerificationResponse {
    fn from(state: VerificationState) -> Self {
        Self {
            attribute: state.attribute_name().to_string(),
            status: state.status().as_str().to_string(),
            proposed_value: Some(state.proposed_value().to_string()),
            failure: state.failure_reason().map(|reason| reason.kind().to_string()),
            delivery: state.delivery().cloned(),
        }
    }
}
