//! Per-attribute verification state machine.
//!
//! Flow Overview:
//! 1) `begin_update` hands out an `InFlight` attempt, tagged with a generation, before the
//!    provider is called.
//! 2) `finish_update` applies the provider's answer only if that generation is still
//!    newer than anything already applied or cancelled for the attribute.
//! 3) `confirm`/`resend` capture the pending generation up front and re-check it when the
//!    provider returns, so an answer for a superseded attempt never lands on the new one.
//!
//! Nothing here awaits. Callers hold the table lock only between provider calls, which is
//! the exclusion scope for each attribute's read-modify-write.

use super::error::WorkflowError;
use crate::provider::{CodeDelivery, UpdateStep};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Idle,
    Pending,
    Confirmed,
    Failed(WorkflowError),
}

impl VerificationStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationState {
    attribute_name: String,
    proposed_value: String,
    status: VerificationStatus,
    delivery: Option<CodeDelivery>,
}

impl VerificationState {
    pub(crate) fn pending(name: &str, value: &str, delivery: Option<CodeDelivery>) -> Self {
        Self {
            attribute_name: name.to_string(),
            proposed_value: value.to_string(),
            status: VerificationStatus::Pending,
            delivery,
        }
    }

    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    #[must_use]
    pub fn proposed_value(&self) -> &str {
        &self.proposed_value
    }

    #[must_use]
    pub fn status(&self) -> &VerificationStatus {
        &self.status
    }

    #[must_use]
    pub fn delivery(&self) -> Option<&CodeDelivery> {
        self.delivery.as_ref()
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&WorkflowError> {
        match &self.status {
            VerificationStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == VerificationStatus::Pending
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            VerificationStatus::Confirmed | VerificationStatus::Failed(_)
        )
    }

    fn fail(&mut self, reason: WorkflowError) {
        self.status = VerificationStatus::Failed(reason);
    }

    fn confirm(&mut self) {
        self.status = VerificationStatus::Confirmed;
    }
}

/// Whether a completed update still speaks for the latest attempt on its attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    Current,
    Stale,
}

/// The pending attempt a confirm or resend was issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingTicket {
    pub(crate) generation: u64,
    pub(crate) value: String,
}

/// What the post-confirmation refresh saw for the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observed<'a> {
    Unavailable,
    Value(Option<&'a str>),
}

#[derive(Debug)]
struct Entry {
    state: VerificationState,
    generation: u64,
    touched_at: Instant,
}

/// An update attempt that has not reported back yet.
///
/// The slot for the attribute is kept while any of these is alive. Dropping one without
/// calling [`StateTable::finish_update`] (the caller's future was cancelled) releases it all
/// the same.
#[derive(Debug)]
pub(crate) struct InFlight {
    generation: u64,
    _attempt: Arc<()>,
}

impl InFlight {
    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    // Completions with a generation at or below `floor` are stale.
    floor: u64,
    // One strong count per live `InFlight`, plus this one.
    attempts: Arc<()>,
    entry: Option<Entry>,
}

impl Slot {
    fn pending_entry_mut(&mut self, generation: u64) -> Option<&mut Entry> {
        self.entry
            .as_mut()
            .filter(|entry| entry.generation == generation && entry.state.is_pending())
    }

    fn is_idle(&self) -> bool {
        self.entry.is_none() && Arc::strong_count(&self.attempts) == 1
    }
}

#[derive(Debug)]
pub(crate) struct StateTable {
    next_generation: u64,
    ttl: Option<Duration>,
    slots: HashMap<String, Slot>,
}

impl StateTable {
    pub(crate) fn new(ttl: Option<Duration>) -> Self {
        Self {
            next_generation: 0,
            ttl,
            slots: HashMap::new(),
        }
    }

    /// Drop entries older than the configured TTL, and slots left with nothing to track.
    pub(crate) fn prune(&mut self, now: Instant) {
        if let Some(ttl) = self.ttl {
            for slot in self.slots.values_mut() {
                if slot
                    .entry
                    .as_ref()
                    .is_some_and(|entry| now.saturating_duration_since(entry.touched_at) >= ttl)
                {
                    slot.entry = None;
                }
            }
        }
        self.slots.retain(|_, slot| !slot.is_idle());
    }

    pub(crate) fn begin_update(&mut self, name: &str) -> InFlight {
        self.next_generation += 1;
        let slot = self.slots.entry(name.to_string()).or_default();
        InFlight {
            generation: self.next_generation,
            _attempt: Arc::clone(&slot.attempts),
        }
    }

    pub(crate) fn finish_update(
        &mut self,
        name: &str,
        attempt: InFlight,
        value: &str,
        result: &Result<UpdateStep, WorkflowError>,
        now: Instant,
    ) -> Freshness {
        let generation = attempt.generation;
        drop(attempt);
        let slot = self.slots.entry(name.to_string()).or_default();
        let freshness = if generation > slot.floor {
            Freshness::Current
        } else {
            Freshness::Stale
        };

        match result {
            Err(err) if err.is_transient() => {}
            _ if freshness == Freshness::Stale => {}
            Ok(UpdateStep::Applied) | Err(_) => {
                slot.floor = generation;
                slot.entry = None;
            }
            Ok(UpdateStep::ConfirmationRequired { delivery }) => {
                slot.floor = generation;
                slot.entry = Some(Entry {
                    state: VerificationState::pending(name, value, delivery.clone()),
                    generation,
                    touched_at: now,
                });
            }
        }

        self.tidy(name);
        freshness
    }

    /// Capture the pending attempt for `name`.
    ///
    /// # Errors
    /// Returns `NoPendingConfirmation` if the attribute is not `Pending`.
    pub(crate) fn pending(&self, name: &str) -> Result<PendingTicket, WorkflowError> {
        self.slots
            .get(name)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| entry.state.is_pending())
            .map(|entry| PendingTicket {
                generation: entry.generation,
                value: entry.state.proposed_value.clone(),
            })
            .ok_or(WorkflowError::NoPendingConfirmation)
    }

    /// Apply the provider's answer to a confirmation code.
    ///
    /// # Errors
    /// Returns `ConfirmationMismatch` if the attempt was superseded or cancelled while the
    /// provider call was in flight, otherwise the provider's error. Non-transient errors
    /// move the entry to `Failed`.
    pub(crate) fn finish_confirm(
        &mut self,
        name: &str,
        ticket: &PendingTicket,
        result: &Result<(), WorkflowError>,
        now: Instant,
    ) -> Result<(), WorkflowError> {
        let Some(entry) = self
            .slots
            .get_mut(name)
            .and_then(|slot| slot.pending_entry_mut(ticket.generation))
        else {
            return Err(WorkflowError::ConfirmationMismatch);
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_transient() => Err(err.clone()),
            Err(err) => {
                entry.state.fail(err.clone());
                entry.touched_at = now;
                Err(err.clone())
            }
        }
    }

    /// Settle an accepted confirmation against the refreshed provider value.
    ///
    /// # Errors
    /// Returns `ConfirmationMismatch` if the attempt is no longer current or the provider
    /// holds a different value than the one proposed.
    pub(crate) fn resolve_confirmed(
        &mut self,
        name: &str,
        ticket: &PendingTicket,
        observed: Observed<'_>,
        now: Instant,
    ) -> Result<VerificationState, WorkflowError> {
        let Some(slot) = self.slots.get_mut(name) else {
            return Err(WorkflowError::ConfirmationMismatch);
        };
        let Some(entry) = slot.pending_entry_mut(ticket.generation) else {
            return Err(WorkflowError::ConfirmationMismatch);
        };

        if let Observed::Value(value) = observed
            && value != Some(ticket.value.as_str())
        {
            entry.state.fail(WorkflowError::ConfirmationMismatch);
            entry.touched_at = now;
            return Err(WorkflowError::ConfirmationMismatch);
        }

        let Some(mut entry) = slot.entry.take() else {
            return Err(WorkflowError::ConfirmationMismatch);
        };
        entry.state.confirm();
        self.tidy(name);
        Ok(entry.state)
    }

    /// Apply the provider's answer to a code resend.
    ///
    /// # Errors
    /// Same policy as [`StateTable::finish_confirm`].
    pub(crate) fn finish_resend(
        &mut self,
        name: &str,
        ticket: &PendingTicket,
        result: &Result<Option<CodeDelivery>, WorkflowError>,
        now: Instant,
    ) -> Result<Option<CodeDelivery>, WorkflowError> {
        let Some(entry) = self
            .slots
            .get_mut(name)
            .and_then(|slot| slot.pending_entry_mut(ticket.generation))
        else {
            return Err(WorkflowError::ConfirmationMismatch);
        };

        match result {
            Ok(delivery) => {
                entry.touched_at = now;
                if delivery.is_some() {
                    entry.state.delivery.clone_from(delivery);
                }
                Ok(entry.state.delivery.clone())
            }
            Err(err) if err.is_transient() => Err(err.clone()),
            Err(err) => {
                entry.state.fail(err.clone());
                entry.touched_at = now;
                Err(err.clone())
            }
        }
    }

    /// Forget the attribute's entry and every attempt issued so far. Returns whether an
    /// entry existed.
    pub(crate) fn cancel(&mut self, name: &str) -> bool {
        let next_generation = self.next_generation;
        let Some(slot) = self.slots.get_mut(name) else {
            return false;
        };
        slot.floor = next_generation;
        let existed = slot.entry.take().is_some();
        self.tidy(name);
        existed
    }

    /// Generations of the entries that are `Failed` right now.
    pub(crate) fn failed_generations(&self) -> BTreeSet<u64> {
        self.slots
            .values()
            .filter_map(|slot| slot.entry.as_ref())
            .filter(|entry| entry.state.is_terminal())
            .map(|entry| entry.generation)
            .collect()
    }

    /// Clear the `Failed` entries listed in `generations`; returns how many were cleared.
    /// Entries that failed after the list was taken are kept.
    pub(crate) fn clear_failed(&mut self, generations: &BTreeSet<u64>) -> usize {
        let mut cleared = 0;
        for slot in self.slots.values_mut() {
            if slot.entry.as_ref().is_some_and(|entry| {
                entry.state.is_terminal() && generations.contains(&entry.generation)
            }) {
                slot.entry = None;
                cleared += 1;
            }
        }
        self.slots.retain(|_, slot| !slot.is_idle());
        cleared
    }

    /// Read the entry for `name`, consuming it if terminal.
    pub(crate) fn observe(&mut self, name: &str) -> Option<VerificationState> {
        let slot = self.slots.get_mut(name)?;
        let state = slot.entry.as_ref()?.state.clone();
        if state.is_terminal() {
            slot.entry = None;
            self.tidy(name);
        }
        Some(state)
    }

    pub(crate) fn status(&self, name: &str) -> VerificationStatus {
        self.slots
            .get(name)
            .and_then(|slot| slot.entry.as_ref())
            .map_or(VerificationStatus::Idle, |entry| entry.state.status.clone())
    }

    pub(crate) fn pending_names(&self) -> BTreeSet<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| {
                slot.entry
                    .as_ref()
                    .is_some_and(|entry| entry.state.is_pending())
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots.len()
    }

    fn tidy(&mut self, name: &str) {
        if self.slots.get(name).is_some_and(Slot::is_idle) {
            self.slots.remove(name);
        }
    }
}
