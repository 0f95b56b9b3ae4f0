//! Bridging context between the page and the background.
//!
//! Reads the shared credential once per request and attaches it to the
//! background call, so requests never depend on state cached in the
//! background. Each page envelope is served on its own task; a slow create
//! never holds up a link rewrite for another session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::background::{BackgroundHandle, BackgroundReply, BackgroundRequest};
use super::credential::CredentialStore;
use super::protocol::{CreateEmailResult, Envelope, Layer, RelayMessage};
use crate::errors::RelayFailure;
use crate::interceptor::SendPayload;

pub struct Bridge {
    to_page: mpsc::UnboundedSender<Envelope>,
    background: BackgroundHandle,
    credentials: CredentialStore,
    timeout: Duration,
}

impl Bridge {
    pub fn new(
        to_page: mpsc::UnboundedSender<Envelope>,
        background: BackgroundHandle,
        credentials: CredentialStore,
        timeout: Duration,
    ) -> Self {
        Self {
            to_page,
            background,
            credentials,
            timeout,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Consume page envelopes until the channel closes.
    pub fn spawn(self: Arc<Self>, mut from_page: mpsc::UnboundedReceiver<Envelope>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = from_page.recv().await {
                if envelope.source != Layer::Page {
                    continue;
                }
                let bridge = self.clone();
                tokio::spawn(async move { bridge.handle(envelope.message).await });
            }
            debug!("bridge inbound closed");
        })
    }

    /// Tell the page whether sends should be tracked.
    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.post(RelayMessage::TrackingSet { enabled });
    }

    fn post(&self, message: RelayMessage) {
        let kind = message.kind();
        if self
            .to_page
            .send(Envelope::new(Layer::Bridge, message))
            .is_err()
        {
            warn!("page unavailable, dropped {}", kind);
        }
    }

    pub async fn handle(&self, message: RelayMessage) {
        match message {
            RelayMessage::ComposeReady(ready) => {
                self.background
                    .notify(BackgroundRequest::ComposeReady(ready));
            }
            RelayMessage::ComposeSend(payload) => {
                let compose_id = payload.compose_id.clone();
                let resp = self.create(payload).await;
                self.post(RelayMessage::CreateResponse { compose_id, resp });
            }
            RelayMessage::RewriteLink {
                request_id,
                email_id,
                url,
            } => {
                let rewritten = self.rewrite(&email_id, &url).await;
                self.post(RelayMessage::RewriteResponse {
                    request_id,
                    original: url,
                    rewritten,
                });
            }
            other => debug!("bridge ignoring {}", other.kind()),
        }
    }

    async fn create(&self, payload: SendPayload) -> CreateEmailResult {
        let Some(credential) = self.credentials.current() else {
            debug!("no credential, not creating {}", payload.compose_id);
            return CreateEmailResult::failure(RelayFailure::NoToken);
        };
        let request = BackgroundRequest::CreateEmail {
            credential,
            payload,
        };
        match self.background.call(request, self.timeout).await {
            Ok(BackgroundReply::Created(Ok(created))) => CreateEmailResult::success(created),
            Ok(BackgroundReply::Created(Err(failure))) | Err(failure) => {
                log_failure("create", &failure);
                CreateEmailResult::failure(failure)
            }
            Ok(other) => CreateEmailResult::failure(RelayFailure::BadResponse(format!(
                "unexpected reply {:?}",
                other
            ))),
        }
    }

    async fn rewrite(&self, email_id: &str, url: &str) -> Option<String> {
        let credential = self.credentials.current()?;
        let request = BackgroundRequest::RewriteLink {
            credential,
            email_id: email_id.to_string(),
            url: url.to_string(),
        };
        match self.background.call(request, self.timeout).await {
            Ok(BackgroundReply::Rewritten(Ok(rewritten))) => Some(rewritten),
            Ok(BackgroundReply::Rewritten(Err(failure))) | Err(failure) => {
                log_failure("rewrite", &failure);
                None
            }
            Ok(other) => {
                warn!("unexpected background reply {:?}", other);
                None
            }
        }
    }
}

/// Transient failures are routine (backend restarting, slow network); the
/// rest point at configuration or a backend bug.
fn log_failure(op: &str, failure: &RelayFailure) {
    if failure.is_transient() {
        debug!("{} failed ({}): {}", op, failure.code(), failure);
    } else {
        warn!("{} failed ({}): {}", op, failure.code(), failure);
    }
}

#[cfg(test)]
mod tests;
