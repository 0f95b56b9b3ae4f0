//! Page-context end of the relay.
//!
//! Posts envelopes toward the bridge and waits for replies carrying the same
//! correlation id. Replies are accepted only from the bridge layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TrackingRelay;
use super::pending::PendingReplies;
use super::protocol::{ComposeReady, CreateEmailResult, CreatedEmail, Envelope, Layer, RelayMessage};
use crate::interceptor::SendPayload;

pub struct PageRelay {
    outbound: mpsc::UnboundedSender<Envelope>,
    creates: PendingReplies<CreateEmailResult>,
    rewrites: PendingReplies<Option<String>>,
    tracking: Arc<AtomicBool>,
    timeout: Duration,
}

impl PageRelay {
    pub fn new(outbound: mpsc::UnboundedSender<Envelope>, timeout: Duration) -> Self {
        Self {
            outbound,
            creates: PendingReplies::new(),
            rewrites: PendingReplies::new(),
            tracking: Arc::new(AtomicBool::new(true)),
            timeout,
        }
    }

    /// Flag flipped by `tracking:set`; the page driver reads it at click time.
    pub fn tracking_flag(&self) -> Arc<AtomicBool> {
        self.tracking.clone()
    }

    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.tracking.store(enabled, Ordering::Relaxed);
    }

    pub fn pending_count(&self) -> usize {
        self.creates.len() + self.rewrites.len()
    }

    fn post(&self, message: RelayMessage) -> bool {
        let kind = message.kind();
        if self
            .outbound
            .send(Envelope::new(Layer::Page, message))
            .is_err()
        {
            warn!("bridge unavailable, dropped {}", kind);
            return false;
        }
        true
    }

    /// Route one inbound envelope to its waiter.
    pub fn dispatch(&self, envelope: Envelope) {
        if envelope.source != Layer::Bridge {
            return;
        }
        match envelope.message {
            RelayMessage::CreateResponse { compose_id, resp } => {
                self.creates.complete(&compose_id, resp);
            }
            RelayMessage::RewriteResponse {
                request_id,
                rewritten,
                ..
            } => {
                self.rewrites.complete(&request_id, rewritten);
            }
            RelayMessage::TrackingSet { enabled } => {
                self.tracking.store(enabled, Ordering::Relaxed);
                info!("tracking set to {}", enabled);
            }
            other => debug!("page ignoring {}", other.kind()),
        }
    }

    /// Consume envelopes from the bridge until the channel closes.
    pub fn spawn_dispatcher(
        self: &Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                relay.dispatch(envelope);
            }
            debug!("page relay inbound closed");
        })
    }
}

#[async_trait]
impl TrackingRelay for PageRelay {
    async fn create_email(&self, payload: SendPayload) -> Option<CreatedEmail> {
        let compose_id = payload.compose_id.clone();
        let rx = self.creates.register(&compose_id);
        if !self.post(RelayMessage::ComposeSend(payload)) {
            self.creates.cancel(&compose_id);
            return None;
        }
        let resp = self.creates.await_reply(&compose_id, rx, self.timeout).await?;
        if let Some(error) = &resp.error {
            if error.is_transient() {
                debug!("create failed for {}: {}", compose_id, error.code());
            } else {
                warn!(
                    "create failed for {}: {} ({})",
                    compose_id,
                    error,
                    error.code()
                );
            }
        }
        resp.into_created()
    }

    async fn rewrite_link(&self, email_id: &str, url: &str) -> Option<String> {
        let request_id = format!("rw_{}", Uuid::new_v4().simple());
        let rx = self.rewrites.register(&request_id);
        let posted = self.post(RelayMessage::RewriteLink {
            request_id: request_id.clone(),
            email_id: email_id.to_string(),
            url: url.to_string(),
        });
        if !posted {
            self.rewrites.cancel(&request_id);
            return None;
        }
        self.rewrites
            .await_reply(&request_id, rx, self.timeout)
            .await
            .flatten()
    }

    fn announce_ready(&self, ready: ComposeReady) {
        self.post(RelayMessage::ComposeReady(ready));
    }
}

#[cfg(test)]
mod tests;
