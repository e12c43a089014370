//! In-memory identity provider for local development and tests.
//!
//! Verifiable attributes (by default `email` and `phone_number`) are not
//! changed on update. The provider parks the proposed value behind a six digit
//! code, hands the code to a [`CodeSender`], and only writes the value once the
//! code is confirmed. Any other attribute is applied immediately.
//!
//! Behaviour mirrors a hosted identity service closely enough to exercise the
//! workflow: codes expire, wrong guesses are counted, and a new update for the
//! same attribute invalidates the previous code.

use super::{
    AttributeMap, CodeDelivery, CodeMessage, CodeSender, DeliveryMedium, IdentityProvider,
    ProviderError, UpdateStep, delivery::mask_destination,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

const DEFAULT_CODE_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_VERIFIABLE_ATTRIBUTES: [&str; 2] = ["email", "phone_number"];

#[derive(Clone, Debug)]
pub struct MemoryProviderConfig {
    verifiable: BTreeSet<String>,
    code_ttl: Duration,
    max_attempts: u32,
}

impl MemoryProviderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            verifiable: DEFAULT_VERIFIABLE_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect(),
            code_ttl: Duration::from_secs(DEFAULT_CODE_TTL_SECONDS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_verifiable_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verifiable = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.code_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn is_verifiable(&self, name: &str) -> bool {
        self.verifiable.contains(name)
    }

    #[must_use]
    pub fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for MemoryProviderConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingCode {
    value: String,
    code: SecretString,
    issued_at: Instant,
    failed_attempts: u32,
}

#[derive(Default)]
struct Account {
    attributes: AttributeMap,
    pending: HashMap<String, PendingCode>,
}

pub struct MemoryProvider {
    config: MemoryProviderConfig,
    sender: Arc<dyn CodeSender>,
    available: AtomicBool,
    account: Mutex<Account>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(
        attributes: AttributeMap,
        config: MemoryProviderConfig,
        sender: Arc<dyn CodeSender>,
    ) -> Self {
        Self {
            config,
            sender,
            available: AtomicBool::new(true),
            account: Mutex::new(Account {
                attributes,
                pending: HashMap::new(),
            }),
        }
    }

    /// Toggle simulated availability; while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), ProviderError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(
                "memory provider is offline".to_string(),
            ))
        }
    }

    fn issue_code(
        &self,
        name: &str,
        value: &str,
    ) -> Result<(SecretString, CodeDelivery), ProviderError> {
        let code = SecretString::from(generate_code());
        let medium = DeliveryMedium::for_attribute(name);
        let message = CodeMessage {
            attribute: name.to_string(),
            destination: value.to_string(),
            medium,
            code: code.clone(),
        };
        self.sender.send(&message).map_err(|err| {
            error!("Failed to deliver verification code: {err}");
            ProviderError::Unavailable("code delivery failed".to_string())
        })?;

        Ok((
            code,
            CodeDelivery {
                destination: Some(mask_destination(medium, value)),
                medium,
            },
        ))
    }
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn fetch_attributes(&self) -> Result<AttributeMap, ProviderError> {
        self.ensure_available()?;
        Ok(self.account.lock().await.attributes.clone())
    }

    async fn update_attribute(&self, name: &str, value: &str) -> Result<UpdateStep, ProviderError> {
        self.ensure_available()?;
        validate_value(name, value)?;

        let mut account = self.account.lock().await;
        if !self.config.is_verifiable(name) {
            account.pending.remove(name);
            account
                .attributes
                .insert(name.to_string(), value.to_string());
            debug!(attribute = name, "attribute applied");
            return Ok(UpdateStep::Applied);
        }

        let (code, delivery) = self.issue_code(name, value)?;
        // Replacing the entry invalidates any code issued for an earlier value.
        account.pending.insert(
            name.to_string(),
            PendingCode {
                value: value.to_string(),
                code,
                issued_at: Instant::now(),
                failed_attempts: 0,
            },
        );
        debug!(attribute = name, "attribute parked behind confirmation code");

        Ok(UpdateStep::ConfirmationRequired {
            delivery: Some(delivery),
        })
    }

    async fn confirm_attribute(
        &self,
        name: &str,
        code: &SecretString,
    ) -> Result<(), ProviderError> {
        self.ensure_available()?;

        let mut account = self.account.lock().await;
        let Some(pending) = account.pending.get_mut(name) else {
            return Err(ProviderError::InvalidCode);
        };

        if pending.issued_at.elapsed() >= self.config.code_ttl {
            account.pending.remove(name);
            return Err(ProviderError::CodeExpired);
        }

        if pending.failed_attempts >= self.config.max_attempts {
            return Err(ProviderError::TooManyAttempts);
        }

        if pending.code.expose_secret() != code.expose_secret() {
            pending.failed_attempts += 1;
            return Err(ProviderError::InvalidCode);
        }

        if let Some(pending) = account.pending.remove(name) {
            account.attributes.insert(name.to_string(), pending.value);
        }
        debug!(attribute = name, "attribute confirmed");

        Ok(())
    }

    async fn send_verification_code(
        &self,
        name: &str,
    ) -> Result<Option<CodeDelivery>, ProviderError> {
        self.ensure_available()?;

        let mut account = self.account.lock().await;
        let Some(pending) = account.pending.get_mut(name) else {
            return Err(ProviderError::Rejected(format!(
                "no verification in progress for {name}"
            )));
        };

        let (code, delivery) = self.issue_code(name, &pending.value)?;
        pending.code = code;
        pending.issued_at = Instant::now();
        pending.failed_attempts = 0;

        Ok(Some(delivery))
    }
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:06}")
}

// Patterns are literals; `None` only if one fails to compile, which rejects every value.
static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
static PHONE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").ok());

fn validate_value(name: &str, value: &str) -> Result<(), ProviderError> {
    let pattern: &Option<Regex> = match name {
        "email" => &EMAIL_PATTERN,
        "phone_number" => &PHONE_PATTERN,
        _ => return Ok(()),
    };
    let valid = pattern.as_ref().is_some_and(|re| re.is_match(value));
    if valid {
        Ok(())
    } else {
        Err(ProviderError::Rejected(format!("invalid {name} format")))
    }
}
