//! Cooperative cancellation token
//!
//! A token is a shared boolean flag carried on a `watch` channel. Every clone
//! observes the same flag, so the pool, the timeout trigger and the running
//! call all see a cancellation the moment any of them requests it. The token
//! id doubles as the operation's identity.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone)]
pub struct CancelToken {
    id: Uuid,
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            tx: Arc::new(tx),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the wait cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
