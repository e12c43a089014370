//! # Attribute verification workflow
//!
//! [`AttributeWorkflow`] owns the account's [`AttributeSnapshot`] and one
//! [`VerificationState`] per attribute with an update in progress. Every change
//! goes through the injected [`IdentityProvider`]:
//!
//! - `fetch` replaces the snapshot wholesale and clears the `Failed` entries that
//!   existed when it started.
//! - `request_update` either applies the value immediately (snapshot refreshed)
//!   or parks it as `Pending` until a delivered code is confirmed.
//! - `confirm` resolves a `Pending` entry to `Confirmed` (entry cleared,
//!   snapshot refreshed) or `Failed(reason)` (entry kept until observed).
//! - `cancel` drops local interest without calling the provider.
//!
//! ## Concurrency
//!
//! Provider calls are the only suspension points and the state table lock is
//! never held across them, so a slow call for one attribute never blocks
//! another. Each update attempt carries a generation; an answer that arrives
//! after its attempt was superseded or cancelled is discarded instead of
//! overwriting newer state.

mod config;
mod error;
mod snapshot;
mod state;

pub use config::WorkflowConfig;
pub use error::WorkflowError;
pub use snapshot::AttributeSnapshot;
pub use state::{VerificationState, VerificationStatus};

use crate::provider::{CodeDelivery, IdentityProvider, ProviderError, UpdateStep};
use secrecy::SecretString;
use snapshot::SnapshotCell;
use state::{Freshness, Observed, StateTable};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    ConfirmationRequired { delivery: Option<CodeDelivery> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed { value: String },
}

pub struct AttributeWorkflow {
    provider: Arc<dyn IdentityProvider>,
    snapshot: SnapshotCell,
    states: Mutex<StateTable>,
}

impl AttributeWorkflow {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, config: WorkflowConfig) -> Self {
        Self {
            provider,
            snapshot: SnapshotCell::new(),
            states: Mutex::new(StateTable::new(config.entry_ttl())),
        }
    }

    /// The last snapshot installed by a successful fetch.
    pub async fn snapshot(&self) -> Arc<AttributeSnapshot> {
        self.snapshot.current().await
    }

    /// Pull the full attribute set and replace the snapshot.
    ///
    /// # Errors
    /// Returns `ProviderUnavailable` if the provider cannot be read; the current snapshot and
    /// verification entries are left as they were.
    #[instrument(skip(self))]
    pub async fn fetch(&self) -> Result<Arc<AttributeSnapshot>, WorkflowError> {
        let failed = self.lock_states().await.failed_generations();
        let snapshot = self.refresh().await?;

        let cleared = self.lock_states().await.clear_failed(&failed);
        if cleared > 0 {
            debug!(cleared, "cleared failed verification entries");
        }

        Ok(snapshot)
    }

    /// Submit a new value for `name`.
    ///
    /// # Errors
    /// - `EmptyName`/`EmptyValue` for blank input, without calling the provider.
    /// - `ProviderRejected` if the provider refuses the value; any entry for `name` is cleared.
    /// - `ProviderUnavailable` on transient failure; existing state is untouched.
    /// - `ConfirmationMismatch` if the attempt was superseded or cancelled before the
    ///   provider answered.
    #[instrument(skip_all, fields(attribute = %name))]
    pub async fn request_update(
        &self,
        name: &str,
        value: &str,
    ) -> Result<UpdateOutcome, WorkflowError> {
        let name = normalize_name(name)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(WorkflowError::EmptyValue);
        }

        let attempt = self.lock_states().await.begin_update(name);
        let generation = attempt.generation();
        let result = self
            .provider
            .update_attribute(name, value)
            .await
            .map_err(|err| provider_failure("update_attribute", err));
        let freshness =
            self.lock_states()
                .await
                .finish_update(name, attempt, value, &result, Instant::now());

        match result? {
            UpdateStep::Applied => {
                info!("attribute applied");
                self.refresh_after("update_attribute").await;
                Ok(UpdateOutcome::Applied)
            }
            UpdateStep::ConfirmationRequired { delivery } => match freshness {
                Freshness::Current => {
                    info!("attribute awaiting confirmation");
                    Ok(UpdateOutcome::ConfirmationRequired { delivery })
                }
                Freshness::Stale => {
                    debug!(generation, "update superseded while in flight");
                    Err(WorkflowError::ConfirmationMismatch)
                }
            },
        }
    }

    /// Confirm the pending update of `name` with a delivered code.
    ///
    /// # Errors
    /// - `NoPendingConfirmation` if `name` is not `Pending`, `EmptyCode` for a blank code.
    /// - `InvalidCode`, `CodeExpired`, `TooManyAttempts` from the provider; the entry moves to
    ///   `Failed` and stays until the next `fetch`, `observe` or `cancel`.
    /// - `ConfirmationMismatch` if the attempt was superseded while the code was checked, or
    ///   the provider ended up holding a different value than the one proposed. A code the
    ///   provider accepted still refreshes the snapshot.
    /// - `ProviderUnavailable` on transient failure; the entry stays `Pending`.
    #[instrument(skip_all, fields(attribute = %name))]
    pub async fn confirm(&self, name: &str, code: &str) -> Result<ConfirmOutcome, WorkflowError> {
        let name = normalize_name(name)?;
        let ticket = self.lock_states().await.pending(name)?;

        let code = code.trim();
        if code.is_empty() {
            return Err(WorkflowError::EmptyCode);
        }
        let code = SecretString::from(code.to_string());

        let result = self
            .provider
            .confirm_attribute(name, &code)
            .await
            .map_err(|err| provider_failure("confirm_attribute", err));
        let settled = self
            .lock_states()
            .await
            .finish_confirm(name, &ticket, &result, Instant::now());
        if let Err(err) = settled {
            if result.is_ok() {
                // The provider applied a value even though the attempt is gone locally.
                debug!("confirmation superseded while in flight");
                self.refresh_after("confirm_attribute").await;
            }
            return Err(err);
        }

        let refreshed = match self.refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("snapshot refresh after confirmation failed: {err}");
                None
            }
        };
        let observed = refreshed
            .as_ref()
            .map_or(Observed::Unavailable, |snapshot| {
                Observed::Value(snapshot.get(name))
            });

        let state = self
            .lock_states()
            .await
            .resolve_confirmed(name, &ticket, observed, Instant::now())?;
        info!("attribute confirmed");

        Ok(ConfirmOutcome::Confirmed {
            value: state.proposed_value().to_string(),
        })
    }

    /// Ask the provider to deliver a fresh code for the pending update of `name`.
    ///
    /// # Errors
    /// `NoPendingConfirmation` without a `Pending` entry; otherwise the same failure policy as
    /// [`AttributeWorkflow::confirm`].
    #[instrument(skip_all, fields(attribute = %name))]
    pub async fn resend_code(&self, name: &str) -> Result<Option<CodeDelivery>, WorkflowError> {
        let name = normalize_name(name)?;
        let ticket = self.lock_states().await.pending(name)?;

        let result = self
            .provider
            .send_verification_code(name)
            .await
            .map_err(|err| provider_failure("send_verification_code", err));
        let delivery =
            self.lock_states()
                .await
                .finish_resend(name, &ticket, &result, Instant::now())?;
        info!("verification code resent");

        Ok(delivery)
    }

    /// Drop any `Pending` or `Failed` entry for `name`. In-flight provider calls are not
    /// aborted; their answers are discarded when they arrive.
    #[instrument(skip_all, fields(attribute = %name))]
    pub async fn cancel(&self, name: &str) {
        if self.lock_states().await.cancel(name.trim()) {
            info!("verification cancelled");
        }
    }

    /// Names of the attributes currently waiting for a code.
    pub async fn pending_attributes(&self) -> BTreeSet<String> {
        self.lock_states().await.pending_names()
    }

    /// Current status of `name`, without consuming terminal entries.
    pub async fn status(&self, name: &str) -> VerificationStatus {
        self.lock_states().await.status(name.trim())
    }

    /// Current entry of `name`; a terminal entry is returned once and then cleared.
    pub async fn observe(&self, name: &str) -> Option<VerificationState> {
        self.lock_states().await.observe(name.trim())
    }

    /// Whether the provider answers a read right now. Does not touch the snapshot.
    pub async fn provider_reachable(&self) -> bool {
        self.provider.fetch_attributes().await.is_ok()
    }

    async fn lock_states(&self) -> MutexGuard<'_, StateTable> {
        let mut states = self.states.lock().await;
        states.prune(Instant::now());
        states
    }

    async fn refresh(&self) -> Result<Arc<AttributeSnapshot>, WorkflowError> {
        let ticket = self.snapshot.issue();
        let values = self
            .provider
            .fetch_attributes()
            .await
            .map_err(|err| provider_failure("fetch_attributes", err))?;
        Ok(self.snapshot.replace(ticket, values).await)
    }

    async fn refresh_after(&self, operation: &'static str) {
        if let Err(err) = self.refresh().await {
            warn!(operation, "snapshot refresh failed: {err}");
        }
    }
}

fn normalize_name(name: &str) -> Result<&str, WorkflowError> {
    let name = name.trim();
    if name.is_empty() {
        Err(WorkflowError::EmptyName)
    } else {
        Ok(name)
    }
}

fn provider_failure(operation: &'static str, err: ProviderError) -> WorkflowError {
    match &err {
        ProviderError::Unavailable(detail) => {
            warn!(operation, "identity provider unavailable: {detail}");
        }
        other => debug!(operation, "identity provider refused: {other}"),
    }
    err.into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::{
        AttributeMap, CodeMessage, CodeSender, MemoryProvider, MemoryProviderConfig,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSender {
        codes: StdMutex<Vec<String>>,
    }

    impl RecordingSender {
        fn last(&self) -> String {
            self.codes.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    impl CodeSender for RecordingSender {
        fn send(&self, message: &CodeMessage) -> anyhow::Result<()> {
            self.codes
                .lock()
                .unwrap()
                .push(message.code.expose_secret().to_string());
            Ok(())
        }
    }

    struct Harness {
        workflow: AttributeWorkflow,
        provider: Arc<MemoryProvider>,
        sender: Arc<RecordingSender>,
    }

    fn harness(config: WorkflowConfig) -> Harness {
        let sender = Arc::new(RecordingSender::default());
        let mut attributes = AttributeMap::new();
        attributes.insert("email".to_string(), "old@example.com".to_string());
        attributes.insert("name".to_string(), "Jane".to_string());
        let provider = Arc::new(MemoryProvider::new(
            attributes,
            MemoryProviderConfig::new(),
            sender.clone(),
        ));
        Harness {
            workflow: AttributeWorkflow::new(provider.clone(), config),
            provider,
            sender,
        }
    }

    // Never answers an update; every other call succeeds.
    struct StalledProvider;

    #[async_trait]
    impl IdentityProvider for StalledProvider {
        async fn fetch_attributes(&self) -> Result<AttributeMap, ProviderError> {
            Ok(AttributeMap::new())
        }

        async fn update_attribute(
            &self,
            _name: &str,
            _value: &str,
        ) -> Result<UpdateStep, ProviderError> {
            std::future::pending().await
        }

        async fn confirm_attribute(
            &self,
            _name: &str,
            _code: &SecretString,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn send_verification_code(
            &self,
            _name: &str,
        ) -> Result<Option<CodeDelivery>, ProviderError> {
            Ok(None)
        }
    }

    fn wrong_code(right: &str) -> &'static str {
        if right == "000000" { "111111" } else { "000000" }
    }

    #[tokio::test]
    async fn snapshot_is_empty_until_fetched() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        assert!(h.workflow.snapshot().await.is_empty());

        let snapshot = h.workflow.fetch().await?;
        assert_eq!(snapshot.get("email"), Some("old@example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn email_change_is_confirmed_with_delivered_code() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.fetch().await?;

        let outcome = h
            .workflow
            .request_update("email", "  new@example.com ")
            .await?;
        assert!(matches!(
            outcome,
            UpdateOutcome::ConfirmationRequired { delivery: Some(_) }
        ));
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Pending);
        assert_eq!(
            h.workflow.snapshot().await.get("email"),
            Some("old@example.com")
        );

        let outcome = h.workflow.confirm("email", &h.sender.last()).await?;
        assert_eq!(
            outcome,
            ConfirmOutcome::Confirmed {
                value: "new@example.com".to_string()
            }
        );
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Idle);
        assert_eq!(
            h.workflow.snapshot().await.get("email"),
            Some("new@example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn plain_attribute_is_applied_and_refreshed() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        let outcome = h.workflow.request_update("name", "Janet").await?;
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(h.workflow.snapshot().await.get("name"), Some("Janet"));
        assert!(h.workflow.pending_attributes().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn blank_input_is_rejected_locally() {
        let h = harness(WorkflowConfig::new());
        assert_eq!(
            h.workflow.request_update("email", "   ").await,
            Err(WorkflowError::EmptyValue)
        );
        assert_eq!(
            h.workflow.request_update(" ", "x").await,
            Err(WorkflowError::EmptyName)
        );
        assert_eq!(
            h.workflow.confirm("email", "123456").await,
            Err(WorkflowError::NoPendingConfirmation)
        );
    }

    #[tokio::test]
    async fn empty_code_with_pending_entry() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.request_update("email", "new@example.com").await?;
        assert_eq!(
            h.workflow.confirm("email", " ").await,
            Err(WorkflowError::EmptyCode)
        );
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_fails_until_fetch_observes_it() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.request_update("email", "new@example.com").await?;

        let result = h
            .workflow
            .confirm("email", wrong_code(&h.sender.last()))
            .await;
        assert_eq!(result, Err(WorkflowError::InvalidCode));
        assert_eq!(
            h.workflow.status("email").await,
            VerificationStatus::Failed(WorkflowError::InvalidCode)
        );
        assert_eq!(
            h.workflow.confirm("email", &h.sender.last()).await,
            Err(WorkflowError::NoPendingConfirmation)
        );

        h.workflow.fetch().await?;
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn provider_rejection_clears_pending_entry() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.request_update("email", "new@example.com").await?;

        let result = h.workflow.request_update("email", "not-an-email").await;
        assert!(matches!(result, Err(WorkflowError::ProviderRejected(_))));
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn outage_keeps_snapshot_and_pending_entry() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.fetch().await?;
        h.workflow.request_update("email", "new@example.com").await?;

        h.provider.set_available(false);
        assert_eq!(
            h.workflow.fetch().await,
            Err(WorkflowError::ProviderUnavailable)
        );
        assert_eq!(
            h.workflow.request_update("email", "other@example.com").await,
            Err(WorkflowError::ProviderUnavailable)
        );
        assert_eq!(
            h.workflow.confirm("email", &h.sender.last()).await,
            Err(WorkflowError::ProviderUnavailable)
        );
        assert_eq!(
            h.workflow.snapshot().await.get("email"),
            Some("old@example.com")
        );
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Pending);

        h.provider.set_available(true);
        h.workflow.confirm("email", &h.sender.last()).await?;
        assert_eq!(
            h.workflow.snapshot().await.get("email"),
            Some("new@example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_clears_pending() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.cancel("email").await;

        h.workflow.request_update("email", "new@example.com").await?;
        h.workflow.cancel("email").await;
        h.workflow.cancel("email").await;

        assert_eq!(
            h.workflow.confirm("email", &h.sender.last()).await,
            Err(WorkflowError::NoPendingConfirmation)
        );
        Ok(())
    }

    #[tokio::test]
    async fn resend_keeps_entry_pending_with_new_code() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        assert_eq!(
            h.workflow.resend_code("email").await,
            Err(WorkflowError::NoPendingConfirmation)
        );

        h.workflow.request_update("email", "new@example.com").await?;
        let delivery = h.workflow.resend_code("email").await?;
        assert!(delivery.is_some());
        assert_eq!(h.workflow.status("email").await, VerificationStatus::Pending);

        h.workflow.confirm("email", &h.sender.last()).await?;
        assert_eq!(
            h.workflow.snapshot().await.get("email"),
            Some("new@example.com")
        );
        Ok(())
    }

    #[tokio::test]
    async fn observe_consumes_failed_entry() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.request_update("email", "new@example.com").await?;
        let _ = h
            .workflow
            .confirm("email", wrong_code(&h.sender.last()))
            .await;

        let state = h.workflow.observe("email").await;
        assert_eq!(
            state.as_ref().and_then(VerificationState::failure_reason),
            Some(&WorkflowError::InvalidCode)
        );
        assert_eq!(
            state.as_ref().map(VerificationState::proposed_value),
            Some("new@example.com")
        );
        assert_eq!(h.workflow.observe("email").await, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pending_entry_expires() -> Result<()> {
        let h = harness(WorkflowConfig::new().with_entry_ttl_seconds(60));
        h.workflow.request_update("email", "new@example.com").await?;
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(h.workflow.pending_attributes().await.is_empty());
        assert_eq!(
            h.workflow.confirm("email", &h.sender.last()).await,
            Err(WorkflowError::NoPendingConfirmation)
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_fetch_yields_identical_snapshots() -> Result<()> {
        let h = harness(WorkflowConfig::new());
        h.workflow.request_update("name", "Janet").await?;
        let first = h.workflow.fetch().await?;
        let second = h.workflow.fetch().await?;
        assert_eq!(first, second);
        assert!(h.workflow.provider_reachable().await);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_update_leaves_no_state_behind() {
        let workflow = AttributeWorkflow::new(
            Arc::new(StalledProvider),
            WorkflowConfig::new().with_entry_ttl_seconds(1),
        );

        for n in 0..100 {
            let name = format!("attribute_{n}");
            let update = workflow.request_update(&name, "value");
            assert!(
                tokio::time::timeout(Duration::from_millis(10), update)
                    .await
                    .is_err()
            );
        }
        tokio::time::advance(Duration::from_secs(3600)).await;

        assert!(workflow.pending_attributes().await.is_empty());
        assert_eq!(workflow.states.lock().await.tracked(), 0);
    }
}
