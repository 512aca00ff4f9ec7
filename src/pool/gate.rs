use crate::fetch::error::FetchError;
use crate::pool::PoolError;
use anyhow::Result;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio_util::sync::CancellationToken;

struct GateState {
    last_completed: u64,
}

/// Serializes commits by job order. Job `n` may commit only once job `n - 1`
/// has; waiting jobs park on a notification instead of polling, and the
/// state lock is held for the whole commit.
pub struct CommitGate {
    state: Mutex<GateState>,
    notify: Notify,
}

/// Exclusive right to commit one order. Dropping it without calling
/// [`CommitTurn::complete`] leaves the gate where it was.
pub struct CommitTurn<'a> {
    gate: &'a CommitGate,
    state: MutexGuard<'a, GateState>,
    order: u64,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::with_last_completed(0)
    }

    pub fn with_last_completed(last_completed: u64) -> Self {
        Self {
            state: Mutex::new(GateState { last_completed }),
            notify: Notify::new(),
        }
    }

    pub async fn last_completed(&self) -> u64 {
        self.state.lock().await.last_completed
    }

    /// Waits until `order` is next in line and returns the locked turn.
    ///
    /// Fails with [`PoolError::OrderingViolation`] when `order` has already
    /// been completed and with [`FetchError::Cancelled`] when `cancellation`
    /// fires first.
    pub async fn wait_for_turn(
        &self,
        order: u64,
        cancellation: &CancellationToken,
    ) -> Result<CommitTurn<'_>> {
        loop {
            let notified = self.notify.notified();
            let state = self.state.lock().await;
            let last_completed = state.last_completed;

            if order <= last_completed {
                return Err(PoolError::OrderingViolation {
                    order,
                    last_completed,
                }
                .into());
            }
            if order == last_completed + 1 {
                return Ok(CommitTurn {
                    gate: self,
                    state,
                    order,
                });
            }
            drop(state);

            tokio::select! {
                _ = notified => {}
                _ = cancellation.cancelled() => return Err(FetchError::Cancelled.into()),
            }
        }
    }

    /// Resolves once `order` has been completed.
    pub async fn wait_until_completed(
        &self,
        order: u64,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            if self.last_completed().await >= order {
                return Ok(());
            }

            tokio::select! {
                _ = notified => {}
                _ = cancellation.cancelled() => return Err(FetchError::Cancelled.into()),
            }
        }
    }
}

impl Default for CommitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitTurn<'_> {
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Marks the order as committed and wakes every waiter.
    pub fn complete(mut self) {
        self.state.last_completed = self.order;
        let gate = self.gate;
        drop(self);
        gate.notify.notify_waiters();
    }
}
