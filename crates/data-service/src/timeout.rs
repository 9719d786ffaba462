//! Deferred cancellation trigger
//!
//! Each tracked operation gets one trigger that cancels it once the deadline
//! passes. Settlement disarms the trigger; a trigger that has already fired
//! goes through the same cancellation path as a caller-initiated `cancel()`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::operation::Operation;

#[derive(Debug)]
pub struct TimeoutGuard {
    handle: JoinHandle<()>,
}

impl TimeoutGuard {
    /// Spawn a trigger that cancels `operation` after `after`.
    ///
    /// A zero duration fires on the next scheduler turn.
    pub fn arm(operation: Operation, after: Duration) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if !operation.is_settled() {
                debug!(
                    operation_id = %operation.id(),
                    timeout_ms = after.as_millis() as u64,
                    "operation timed out, cancelling"
                );
            }
            operation.cancel();
        });
        Self { handle }
    }

    /// Stop the trigger. No-op if it already fired or was disarmed.
    pub fn disarm(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
