//! # Verity (Account Attribute Verification)
//!
//! `verity` keeps a caller's view of an account's attributes (email, phone
//! number, display name, ...) consistent with an external identity provider
//! while those attributes change.
//!
//! ## Verification Model
//!
//! Some attributes change immediately. Others (typically contact details) are
//! only changed once the user proves control of the new value by entering a
//! code the provider delivered out of band.
//!
//! - **One entry per attribute:** each attribute is `Idle`, `Pending`, or
//!   terminally `Confirmed`/`Failed`. A new update for a `Pending` attribute
//!   supersedes the old one; a code for the old attempt can no longer succeed.
//! - **Provider is the source of truth:** the attribute snapshot is only ever
//!   replaced wholesale from a provider read, never patched locally.
//! - **Transient failures are inert:** an unavailable provider never changes
//!   local state, so every operation is safe to retry.
//!
//! ## Layout
//!
//! - [`workflow`]: the `AttributeWorkflow` orchestrator and state machine.
//! - [`provider`]: the `IdentityProvider` capability trait and an in-memory
//!   implementation for development.
//! - [`api`]: HTTP surface over a workflow.
//! - [`cli`]: command line, configuration, and telemetry wiring.

pub mod api;
pub mod cli;
pub mod provider;
pub mod workflow;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
