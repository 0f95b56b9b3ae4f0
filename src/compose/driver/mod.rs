//! Page-side event loop.
//!
//! Document-change notifications arrive in bursts; they are coalesced with a
//! trailing debounce window and only the newest snapshot is reconciled. A
//! click flushes any pending batch first so the monitor never judges a click
//! against stale registrations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::monitor::{ComposeMonitor, MonitorEvent, SessionId};
use super::snapshot::{DocumentSnapshot, NodeId};
use crate::config::ClientConfig;
use crate::interceptor::{InterceptedSend, SendInterceptor};
use crate::relay::TrackingRelay;

/// Default debounce for mutation bursts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(180);

#[derive(Debug, Clone)]
pub enum PageEvent {
    /// The document changed; carries the full post-change snapshot.
    Mutations(DocumentSnapshot),
    /// A click on `button`, with the document as it stood when the click fired.
    Click {
        button: NodeId,
        document: DocumentSnapshot,
    },
}

pub struct PageDriver {
    monitor: ComposeMonitor,
    interceptor: SendInterceptor,
    relay: Arc<dyn TrackingRelay>,
    tracking: Arc<AtomicBool>,
    debounce: Duration,
    outgoing: HashMap<SessionId, InterceptedSend>,
}

impl PageDriver {
    pub fn new(relay: Arc<dyn TrackingRelay>, tracking: Arc<AtomicBool>, debounce: Duration) -> Self {
        let enabled = tracking.load(Ordering::Relaxed);
        Self {
            monitor: ComposeMonitor::new(enabled),
            interceptor: SendInterceptor::new(relay.clone()),
            relay,
            tracking,
            debounce,
            outgoing: HashMap::new(),
        }
    }

    /// Debounce window taken from the client section of the config.
    pub fn from_config(
        relay: Arc<dyn TrackingRelay>,
        tracking: Arc<AtomicBool>,
        config: &ClientConfig,
    ) -> Self {
        Self::new(relay, tracking, config.debounce())
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn monitor(&self) -> &ComposeMonitor {
        &self.monitor
    }

    /// The in-flight or finished send for a session.
    pub fn outgoing(&self, session_id: &str) -> Option<&InterceptedSend> {
        self.outgoing.get(session_id)
    }

    pub fn take_outgoing(&mut self, session_id: &str) -> Option<InterceptedSend> {
        self.outgoing.remove(session_id)
    }

    pub fn outgoing_len(&self) -> usize {
        self.outgoing.len()
    }

    /// Drop sends whose task has finished and whose session is gone.
    fn prune_outgoing(&mut self) {
        let store = self.monitor.store();
        self.outgoing.retain(|session_id, send| {
            let keep = !send.task.is_finished() || store.get(session_id).is_some();
            if !keep {
                debug!("dropping finished send for compose {}", session_id);
            }
            keep
        });
    }

    fn sync_tracking(&mut self) {
        self.monitor
            .set_tracking_enabled(self.tracking.load(Ordering::Relaxed));
    }

    /// Reconcile one snapshot and announce new registrations.
    pub fn flush(&mut self, doc: &DocumentSnapshot) -> Vec<MonitorEvent> {
        self.sync_tracking();
        let events = self.monitor.process_batch(doc);
        self.prune_outgoing();
        for event in &events {
            if let MonitorEvent::Registered { ready, .. } = event {
                self.relay.announce_ready(ready.clone());
            }
        }
        events
    }

    /// Route a click to the monitor; on a send trigger, start tracking and
    /// return the session id.
    pub fn click(&mut self, doc: &DocumentSnapshot, button: NodeId) -> Option<SessionId> {
        self.sync_tracking();
        let trigger = self.monitor.handle_send_click(doc, button)?;
        let session_id = trigger.session_id.clone();
        let send = self.interceptor.intercept(trigger);
        self.outgoing.insert(session_id.clone(), send);
        Some(session_id)
    }

    /// Drive the monitor until the event channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<PageEvent>) -> Self {
        let mut pending: Option<DocumentSnapshot> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(PageEvent::Mutations(doc)) => {
                        pending = Some(doc);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Some(PageEvent::Click { button, document }) => {
                        deadline = None;
                        if let Some(doc) = pending.take() {
                            self.flush(&doc);
                        }
                        self.click(&document, button);
                    }
                    None => {
                        if let Some(doc) = pending.take() {
                            self.flush(&doc);
                        }
                        debug!("page event channel closed, stopping");
                        break;
                    }
                },
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if let Some(doc) = pending.take() {
                        self.flush(&doc);
                    }
                }
            }
        }
        self
    }
}
