//! Send interception.
//!
//! [`build_payload`] is the pure part: root node plus the body snapshot taken
//! at click time. [`SendInterceptor::intercept`] returns immediately and runs
//! the create/inject/rewrite sequence on a background task, so the host's own
//! click handling is never delayed.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::compose::extract::{extract_recipients, extract_subject};
use crate::compose::monitor::SendTrigger;
use crate::compose::snapshot::DomNode;
use crate::injector::{RewriteReport, TrackedBody, rewrite_links};
use crate::relay::TrackingRelay;

/// Metadata captured at the instant of send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub compose_id: String,
    pub subject: String,
    /// Deduplicated; order carries no meaning.
    pub recipients: Vec<String>,
    pub body_markup: String,
}

/// Assemble the payload for one send. A root that has already been detached
/// yields empty subject and recipients rather than failing.
pub fn build_payload(session_id: &str, root: Option<&DomNode>, body_snapshot: &str) -> SendPayload {
    SendPayload {
        compose_id: session_id.to_string(),
        subject: root.map(extract_subject).unwrap_or_default(),
        recipients: root.map(extract_recipients).unwrap_or_default(),
        body_markup: body_snapshot.to_string(),
    }
}

/// What the background task achieved for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingOutcome {
    pub email_id: String,
    pub pixel_injected: bool,
    pub links: RewriteReport,
}

/// A send whose tracking work is running in the background.
pub struct InterceptedSend {
    pub payload: SendPayload,
    /// The outgoing body; the pixel and rewritten links land here.
    pub body: Arc<Mutex<TrackedBody>>,
    pub task: JoinHandle<Option<TrackingOutcome>>,
}

pub struct SendInterceptor {
    relay: Arc<dyn TrackingRelay>,
}

impl SendInterceptor {
    pub fn new(relay: Arc<dyn TrackingRelay>) -> Self {
        Self { relay }
    }

    /// Capture the payload and hand the rest to a background task.
    pub fn intercept(&self, trigger: SendTrigger<'_>) -> InterceptedSend {
        let payload = build_payload(&trigger.session_id, trigger.root, &trigger.body_snapshot);
        debug!(
            "send intercepted: compose={} recipients={} body_len={}",
            payload.compose_id,
            payload.recipients.len(),
            payload.body_markup.len()
        );
        let body = Arc::new(Mutex::new(TrackedBody::new(payload.body_markup.clone())));
        let task = tokio::spawn(track_send(
            self.relay.clone(),
            payload.clone(),
            body.clone(),
        ));
        InterceptedSend {
            payload,
            body,
            task,
        }
    }
}

/// Create the message, then inject the pixel and rewrite links.
///
/// Any relay failure ends tracking for this send; nothing is retried.
pub async fn track_send(
    relay: Arc<dyn TrackingRelay>,
    payload: SendPayload,
    body: Arc<Mutex<TrackedBody>>,
) -> Option<TrackingOutcome> {
    let compose_id = payload.compose_id.clone();
    let Some(created) = relay.create_email(payload).await else {
        info!("tracking skipped for compose {}: no message id", compose_id);
        return None;
    };

    let pixel_injected = match created.pixel_url.as_deref() {
        Some(url) => body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .inject_pixel(url),
        None => {
            debug!("no pixel url for message {}", created.email_id);
            false
        }
    };

    let links = rewrite_links(&body, relay.as_ref(), &created.email_id).await;
    info!(
        "tracking applied: compose={} email={} pixel={} links rewritten={} preserved={}",
        compose_id, created.email_id, pixel_injected, links.rewritten, links.preserved
    );

    Some(TrackingOutcome {
        email_id: created.email_id,
        pixel_injected,
        links,
    })
}
