use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::error::RefreshError;

/// New access token, or the reason the session could not be renewed.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct GateState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Single-flight guard for the token refresh: idle or refreshing, plus the
/// FIFO list of callers waiting on the refresh in flight.
///
/// The lock is never held across an await point.
#[derive(Clone, Default)]
pub struct RefreshGate {
    inner: Arc<Mutex<GateState>>,
}

pub enum GateEntry {
    /// No refresh was running; the caller now owns it and must settle the lease.
    Lead(RefreshLease),
    /// A refresh is in flight; await its outcome.
    Wait(RefreshWaiter),
    /// The session already moved past the failing token; retry with this one.
    Retry(String),
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decides, atomically with respect to other callers, whether to lead a
    /// refresh, join the one in flight, or skip refreshing entirely.
    ///
    /// `superseded` runs under the gate lock when no refresh is in flight and
    /// returns the token to retry with if the caller's token is already stale.
    pub fn enter(&self, superseded: impl FnOnce() -> Option<String>) -> GateEntry {
        let mut state = self.state();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            return GateEntry::Wait(RefreshWaiter { rx });
        }

        if let Some(token) = superseded() {
            return GateEntry::Retry(token);
        }

        state.refreshing = true;
        GateEntry::Lead(RefreshLease {
            gate: self.clone(),
            settled: false,
        })
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().refreshing
    }

    pub fn waiting(&self) -> usize {
        self.state().waiters.len()
    }

    /// Hands `outcome` to every waiter in enqueue order, then reopens the gate.
    fn settle(&self, outcome: &RefreshOutcome) -> usize {
        let mut state = self.state();
        let waiters = std::mem::take(&mut state.waiters);
        let count = waiters.len();
        for tx in waiters {
            // A waiter whose caller went away has nothing left to resume.
            let _ = tx.send(outcome.clone());
        }
        state.refreshing = false;
        count
    }
}

pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    pub async fn outcome(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}

/// Ownership of the refresh in flight. Dropping it unsettled (the leading
/// caller was cancelled) rejects every waiter with [`RefreshError::Abandoned`].
pub struct RefreshLease {
    gate: RefreshGate,
    settled: bool,
}

impl RefreshLease {
    /// Returns how many queued callers were resumed.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.gate.settle(&outcome)
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.gate.settle(&Err(RefreshError::Abandoned));
            tracing::warn!(released, "token refresh abandoned");
        }
    }
}
