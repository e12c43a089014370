//! Attribute snapshot and its atomic holder.

use crate::provider::AttributeMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// The provider's attribute set as of one successful fetch.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSnapshot {
    values: AttributeMap,
}

impl AttributeSnapshot {
    #[must_use]
    pub fn new(values: AttributeMap) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn values(&self) -> &AttributeMap {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

struct Installed {
    ticket: u64,
    snapshot: Arc<AttributeSnapshot>,
}

/// Holds the current snapshot and swaps it wholesale.
///
/// Each fetch takes a ticket before calling the provider. A completed fetch is
/// installed only if its ticket is newer than the installed one, so a slow
/// response never overwrites a fresher snapshot.
pub(crate) struct SnapshotCell {
    next_ticket: AtomicU64,
    installed: RwLock<Installed>,
}

impl SnapshotCell {
    pub(crate) fn new() -> Self {
        Self {
            next_ticket: AtomicU64::new(0),
            installed: RwLock::new(Installed {
                ticket: 0,
                snapshot: Arc::new(AttributeSnapshot::default()),
            }),
        }
    }

    pub(crate) fn issue(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) async fn current(&self) -> Arc<AttributeSnapshot> {
        self.installed.read().await.snapshot.clone()
    }

    /// Install `values` taken under `ticket` and return whatever is current afterwards.
    pub(crate) async fn replace(
        &self,
        ticket: u64,
        values: AttributeMap,
    ) -> Arc<AttributeSnapshot> {
        let mut installed = self.installed.write().await;
        if ticket > installed.ticket {
            installed.ticket = ticket;
            installed.snapshot = Arc::new(AttributeSnapshot::new(values));
        }
        installed.snapshot.clone()
    }
}
