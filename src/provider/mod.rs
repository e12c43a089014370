//! Identity provider capability boundary.
//!
//! The workflow never talks to a concrete identity service. It consumes the
//! [`IdentityProvider`] trait, which any transport can implement. The only
//! implementation shipped here is [`memory::MemoryProvider`], an in-process
//! double used for local development and tests.

pub mod delivery;
pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

pub use delivery::{CodeMessage, CodeSender, LogCodeSender};
pub use memory::{MemoryProvider, MemoryProviderConfig};

/// Attribute name to value, ordered by name.
pub type AttributeMap = BTreeMap<String, String>;

#[derive(ToSchema, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMedium {
    Email,
    Sms,
    Unknown,
}

impl DeliveryMedium {
    #[must_use]
    pub fn for_attribute(name: &str) -> Self {
        match name {
            "email" => Self::Email,
            "phone_number" => Self::Sms,
            _ => Self::Unknown,
        }
    }
}

/// Where a confirmation code was sent. `destination` is masked by the provider.
#[derive(ToSchema, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeDelivery {
    pub destination: Option<String>,
    pub medium: DeliveryMedium,
}

/// What the provider did with an update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStep {
    Applied,
    ConfirmationRequired { delivery: Option<CodeDelivery> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("identity provider rejected the value: {0}")]
    Rejected(String),
    #[error("invalid confirmation code")]
    InvalidCode,
    #[error("confirmation code expired")]
    CodeExpired,
    #[error("too many attempts")]
    TooManyAttempts,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Read the full attribute set of the account.
    async fn fetch_attributes(&self) -> Result<AttributeMap, ProviderError>;

    /// Submit a new value for `name`.
    async fn update_attribute(&self, name: &str, value: &str) -> Result<UpdateStep, ProviderError>;

    /// Complete a pending update of `name` with a delivered code.
    async fn confirm_attribute(&self, name: &str, code: &SecretString) -> Result<(), ProviderError>;

    /// Deliver a fresh code for the update pending on `name`.
    async fn send_verification_code(&self, name: &str)
    -> Result<Option<CodeDelivery>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_medium_for_attribute() {
        assert_eq!(DeliveryMedium::for_attribute("email"), DeliveryMedium::Email);
        assert_eq!(
            DeliveryMedium::for_attribute("phone_number"),
            DeliveryMedium::Sms
        );
        assert_eq!(DeliveryMedium::for_attribute("name"), DeliveryMedium::Unknown);
    }

    #[test]
    fn code_delivery_serializes_snake_case() -> anyhow::Result<()> {
        let delivery = CodeDelivery {
            destination: Some("u***@example.com".to_string()),
            medium: DeliveryMedium::Email,
        };
        let json = serde_json::to_value(&delivery)?;
        assert_eq!(json["medium"], "email");
        assert_eq!(json["destination"], "u***@example.com");
        Ok(())
    }
}
