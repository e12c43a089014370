use crate::provider::ProviderError;
use thiserror::Error;

/// Every way a workflow operation can fail.
///
/// Validation variants never reach the provider. `ProviderUnavailable` is the
/// only transient kind and never mutates workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("attribute name cannot be empty")]
    EmptyName,
    #[error("attribute value cannot be empty")]
    EmptyValue,
    #[error("confirmation code cannot be empty")]
    EmptyCode,
    #[error("no pending confirmation for this attribute")]
    NoPendingConfirmation,
    #[error("value rejected by identity provider: {0}")]
    ProviderRejected(String),
    #[error("invalid confirmation code")]
    InvalidCode,
    #[error("confirmation code expired")]
    CodeExpired,
    #[error("too many attempts")]
    TooManyAttempts,
    #[error("confirmation does not match the current update request")]
    ConfirmationMismatch,
    #[error("identity provider unavailable")]
    ProviderUnavailable,
}

impl WorkflowError {
    /// Stable machine-readable tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::EmptyValue => "empty_value",
            Self::EmptyCode => "empty_code",
            Self::NoPendingConfirmation => "no_pending_confirmation",
            Self::ProviderRejected(_) => "provider_rejected",
            Self::InvalidCode => "invalid_code",
            Self::CodeExpired => "code_expired",
            Self::TooManyAttempts => "too_many_attempts",
            Self::ConfirmationMismatch => "confirmation_mismatch",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable)
    }
}

impl From<ProviderError> for WorkflowError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(_) => Self::ProviderUnavailable,
            ProviderError::Rejected(reason) => Self::ProviderRejected(reason),
            ProviderError::InvalidCode => Self::InvalidCode,
            ProviderError::CodeExpired => Self::CodeExpired,
            ProviderError::TooManyAttempts => Self::TooManyAttempts,
        }
    }
}
