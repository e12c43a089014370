//! Confirmation code delivery.
//!
//! The memory provider hands every generated code to a `CodeSender`. The
//! sender decides how to deliver it (SMTP, SMS gateway, a queue) and returns
//! `Ok`/`Err`. The default sender for local dev is `LogCodeSender`, which
//! logs the message and returns `Ok(())`.

use super::DeliveryMedium;
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Clone, Debug)]
pub struct CodeMessage {
    pub attribute: String,
    pub destination: String,
    pub medium: DeliveryMedium,
    pub code: SecretString,
}

/// Code delivery abstraction used by the memory provider.
pub trait CodeSender: Send + Sync {
    /// Deliver a code or return an error to fail the provider call.
    fn send(&self, message: &CodeMessage) -> Result<()>;
}

/// Local dev sender that logs the code instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, message: &CodeMessage) -> Result<()> {
        info!(
            attribute = %message.attribute,
            destination = %mask_destination(message.medium, &message.destination),
            medium = ?message.medium,
            code = %message.code.expose_secret(),
            "verification code send stub"
        );
        Ok(())
    }
}

/// Mask a destination so only enough remains for the user to recognise it.
#[must_use]
pub fn mask_destination(medium: DeliveryMedium, destination: &str) -> String {
    match medium {
        DeliveryMedium::Email => match destination.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{first}***@{domain}")
            }
            None => "***".to_string(),
        },
        DeliveryMedium::Sms => {
            let digits: Vec<char> = destination.trim_start_matches('+').chars().collect();
            let keep = digits.len().min(4);
            let tail: String = digits[digits.len() - keep..].iter().collect();
            format!("+{}{tail}", "*".repeat(digits.len() - keep))
        }
        DeliveryMedium::Unknown => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_email_keeps_first_char_and_domain() {
        assert_eq!(
            mask_destination(DeliveryMedium::Email, "jane@example.com"),
            "j***@example.com"
        );
        assert_eq!(mask_destination(DeliveryMedium::Email, "not-an-email"), "***");
    }

    #[test]
    fn mask_phone_keeps_last_four_digits() {
        assert_eq!(
            mask_destination(DeliveryMedium::Sms, "+15551234567"),
            "+*******4567"
        );
        assert_eq!(mask_destination(DeliveryMedium::Sms, "+12"), "+12");
    }

    #[test]
    fn log_sender_accepts_messages() {
        let message = CodeMessage {
            attribute: "email".to_string(),
            destination: "jane@example.com".to_string(),
            medium: DeliveryMedium::Email,
            code: SecretString::from("123456"),
        };
        assert!(LogCodeSender.send(&message).is_ok());
    }
}
