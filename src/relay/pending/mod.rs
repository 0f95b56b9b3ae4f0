//! Correlation-id keyed reply table.
//!
//! Each waiter owns one oneshot receiver; the table only holds the matching
//! sender. A reply for an id nobody waits on (already timed out, or never
//! registered) is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

pub struct PendingReplies<T> {
    waiters: Arc<Mutex<HashMap<String, oneshot::Sender<T>>>>,
}

impl<T> Clone for PendingReplies<T> {
    fn clone(&self) -> Self {
        Self {
            waiters: self.waiters.clone(),
        }
    }
}

impl<T> Default for PendingReplies<T> {
    fn default() -> Self {
        Self {
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> PendingReplies<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`. A second registration for the same id
    /// replaces the first, whose receiver then resolves as closed.
    pub fn register(&self, id: &str) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let replaced = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), tx);
        if replaced.is_some() {
            warn!("replaced pending waiter for {}", id);
        }
        rx
    }

    /// Deliver a reply. Returns `false` when nobody is waiting on `id`.
    pub fn complete(&self, id: &str, value: T) -> bool {
        let sender = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => {
                debug!("dropping reply for unknown correlation id {}", id);
                false
            }
        }
    }

    pub fn cancel(&self, id: &str) {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `timeout` for the reply to `id`. Resolves to `None` on
    /// timeout (removing the table entry) or if the sender was replaced.
    pub async fn await_reply(
        &self,
        id: &str,
        rx: oneshot::Receiver<T>,
        timeout: Duration,
    ) -> Option<T> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => {
                debug!("reply channel for {} closed", id);
                None
            }
            Err(_) => {
                warn!("no reply for {} within {:?}", id, timeout);
                self.cancel(id);
                None
            }
        }
    }
}
