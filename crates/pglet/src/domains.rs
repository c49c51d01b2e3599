//! Exclusive-access domains over the single shared engine.
//!
//! Each domain guarantees at most one operation inside it at a time,
//! executing queued work strictly in submission order (the fairness of
//! `tokio::sync::Mutex` is the FIFO queue). Domains group *intent* —
//! they do not provide parallelism, because every operation that
//! actually invokes the engine additionally serializes on the session's
//! global engine lock. A failed unit releases the slot for the next
//! unit; failures propagate to their own caller only.

use std::future::Future;

use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// One mutual-exclusion domain.
#[derive(Debug)]
pub struct ExclusiveDomain {
    name: &'static str,
    lock: Mutex<()>,
}

impl ExclusiveDomain {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    /// Domain name, for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the exclusive slot.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        trace!(domain = self.name, "waiting for exclusive slot");
        let guard = self.lock.lock().await;
        trace!(domain = self.name, "acquired exclusive slot");
        guard
    }

    /// Run one unit of work under the exclusive slot.
    pub async fn run_exclusive<Fut: Future>(&self, work: Fut) -> Fut::Output {
        let _guard = self.acquire().await;
        work.await
    }
}

/// The four domains of a session.
#[derive(Debug)]
pub(crate) struct Domains {
    pub query: ExclusiveDomain,
    pub transaction: ExclusiveDomain,
    pub listen: ExclusiveDomain,
    pub fs_sync: ExclusiveDomain,
}

impl Domains {
    pub fn new() -> Self {
        Self {
            query: ExclusiveDomain::new("query"),
            transaction: ExclusiveDomain::new("transaction"),
            listen: ExclusiveDomain::new("listen"),
            fs_sync: ExclusiveDomain::new("fs-sync"),
        }
    }
}

/// Completion state of a scheduled filesystem sync, broadcast to every
/// caller that coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    Pending,
    Done,
    Failed(String),
}
