//! Compose-session store and the per-batch reconciliation pass.
//!
//! The store is the only shared mutable state on the page side: which
//! sessions exist, which one is primary, and whether a send is in flight.
//! All of it is mutated synchronously from [`ComposeMonitor::process_batch`]
//! and [`ComposeMonitor::handle_send_click`].

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classify::find_compose_surfaces;
use super::extract::{body_markup, extract_recipients, extract_subject, find_body_node};
use super::send_button::{SendButtonChoice, choose_send_button};
use super::snapshot::{DocumentSnapshot, DomNode, NodeId};
use super::state::{
    ComposeEvent, ComposeState, IgnoreReason, RegistrationGate, admit, transition,
};
use crate::relay::protocol::ComposeReady;

pub type SessionId = String;

pub fn new_session_id() -> SessionId {
    let raw = Uuid::new_v4().simple().to_string();
    format!("c_{}", &raw[..12])
}

/// One observed compose surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeSession {
    pub id: SessionId,
    pub root: NodeId,
    /// Looked up once at registration and never re-acquired.
    pub body_node: Option<NodeId>,
    pub send_button: Option<SendButtonChoice>,
    pub state: ComposeState,
    /// Body markup captured at the moment of send.
    pub body_snapshot: Option<String>,
    last_ignored: Option<IgnoreReason>,
}

impl ComposeSession {
    fn candidate(root: NodeId) -> Self {
        Self {
            id: new_session_id(),
            root,
            body_node: None,
            send_button: None,
            state: ComposeState::Candidate,
            body_snapshot: None,
            last_ignored: None,
        }
    }
}

/// Sessions keyed by id, with an explicit primary slot.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, ComposeSession>,
    by_root: HashMap<NodeId, SessionId>,
    /// Send control node → owning session; one handler per surface.
    handlers: HashMap<NodeId, SessionId>,
    primary: Option<SessionId>,
    send_in_progress: bool,
}

impl SessionStore {
    pub fn get(&self, id: &str) -> Option<&ComposeSession> {
        self.sessions.get(id)
    }

    pub fn by_root(&self, root: NodeId) -> Option<&ComposeSession> {
        self.by_root.get(&root).and_then(|id| self.sessions.get(id))
    }

    pub fn primary(&self) -> Option<&ComposeSession> {
        self.primary.as_deref().and_then(|id| self.sessions.get(id))
    }

    pub fn send_in_progress(&self) -> bool {
        self.send_in_progress
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ComposeSession> {
        self.sessions.values()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn insert_candidate(&mut self, root: NodeId) -> SessionId {
        let session = ComposeSession::candidate(root);
        let id = session.id.clone();
        self.by_root.insert(root, id.clone());
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Remove a session whose root left the document. Returns whether it was
    /// the primary.
    fn tear_down(&mut self, id: &str) -> bool {
        let Some(session) = self.sessions.remove(id) else {
            return false;
        };
        if let Err(e) = transition(session.state, ComposeEvent::RootDetached) {
            warn!("{}", e);
        }
        self.by_root.remove(&session.root);
        self.handlers.retain(|_, owner| owner != id);
        let was_primary = self.primary.as_deref() == Some(id);
        if was_primary {
            self.primary = None;
            self.send_in_progress = false;
        }
        was_primary
    }
}

/// Something the monitor decided during a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Registered {
        session_id: SessionId,
        ready: ComposeReady,
    },
    Ignored {
        session_id: SessionId,
        root: NodeId,
        reason: IgnoreReason,
    },
    TornDown {
        session_id: SessionId,
        was_primary: bool,
    },
}

/// Everything the send interceptor needs, taken synchronously at click time.
#[derive(Debug, Clone)]
pub struct SendTrigger<'a> {
    pub session_id: SessionId,
    /// `None` if the host already detached the root.
    pub root: Option<&'a DomNode>,
    pub body_snapshot: String,
}

#[derive(Debug)]
pub struct ComposeMonitor {
    store: SessionStore,
    tracking_enabled: bool,
}

impl Default for ComposeMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ComposeMonitor {
    pub fn new(tracking_enabled: bool) -> Self {
        Self {
            store: SessionStore::default(),
            tracking_enabled,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        if self.tracking_enabled != enabled {
            info!("tracking {}", if enabled { "enabled" } else { "disabled" });
        }
        self.tracking_enabled = enabled;
    }

    /// Reconcile the store against one coalesced document snapshot.
    ///
    /// Teardown runs first so a primary that vanished in this batch frees the
    /// slot for a surface that appeared in the same batch.
    pub fn process_batch(&mut self, doc: &DocumentSnapshot) -> Vec<MonitorEvent> {
        let mut events = Vec::new();

        let detached: Vec<SessionId> = self
            .store
            .sessions
            .values()
            .filter(|s| !doc.contains(s.root))
            .map(|s| s.id.clone())
            .collect();
        for session_id in detached {
            let was_primary = self.store.tear_down(&session_id);
            info!(
                "compose session {} torn down (primary={})",
                session_id, was_primary
            );
            events.push(MonitorEvent::TornDown {
                session_id,
                was_primary,
            });
        }

        for surface in find_compose_surfaces(&doc.root) {
            let session_id = match self.store.by_root.get(&surface.id) {
                Some(id) => id.clone(),
                None => self.store.insert_candidate(surface.id),
            };
            if let Some(event) = self.try_promote(&session_id, surface) {
                events.push(event);
            }
        }

        events
    }

    fn try_promote(&mut self, session_id: &str, surface: &DomNode) -> Option<MonitorEvent> {
        let primary_held = self.store.primary.is_some();
        let send_in_progress = self.store.send_in_progress;
        let session = self.store.sessions.get_mut(session_id)?;
        if session.state != ComposeState::Candidate {
            return None;
        }

        let gate = RegistrationGate {
            visible: surface.is_visible(),
            primary_held,
            send_in_progress,
        };
        if let Err(reason) = admit(gate) {
            if session.last_ignored == Some(reason) {
                return None;
            }
            session.last_ignored = Some(reason);
            debug!(
                "ignoring compose surface node={} session={}: {:?}",
                surface.id, session_id, reason
            );
            return Some(MonitorEvent::Ignored {
                session_id: session_id.to_string(),
                root: surface.id,
                reason,
            });
        }

        session.state = match transition(session.state, ComposeEvent::Promote) {
            Ok(state) => state,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        session.last_ignored = None;
        session.body_node = find_body_node(surface).map(|n| n.id);
        session.send_button = choose_send_button(surface);
        self.store.primary = Some(session_id.to_string());

        match &session.send_button {
            Some(choice) => {
                if self.store.handlers.contains_key(&choice.node) {
                    debug!("send control {} already has a handler", choice.node);
                } else {
                    self.store
                        .handlers
                        .insert(choice.node, session_id.to_string());
                }
                info!(
                    "compose session {} registered (root={} send={} score={} via {:?})",
                    session_id, surface.id, choice.node, choice.score, choice.reason
                );
            }
            None => info!(
                "compose session {} registered without a send control (root={})",
                session_id, surface.id
            ),
        }

        Some(MonitorEvent::Registered {
            session_id: session_id.to_string(),
            ready: ComposeReady {
                compose_id: session_id.to_string(),
                subject: extract_subject(surface),
                recipients: extract_recipients(surface),
            },
        })
    }

    /// Handle a click on `button` against the document as it stands at click
    /// time. Returns the trigger only for the first click of a registered
    /// session's send control while tracking is enabled.
    pub fn handle_send_click<'d>(
        &mut self,
        doc: &'d DocumentSnapshot,
        button: NodeId,
    ) -> Option<SendTrigger<'d>> {
        let session_id = self.store.handlers.get(&button)?.clone();
        if !self.tracking_enabled {
            debug!("tracking disabled, send on {} not intercepted", session_id);
            return None;
        }
        let session = self.store.sessions.get_mut(&session_id)?;
        session.state = match transition(session.state, ComposeEvent::SendClicked) {
            Ok(state) => state,
            Err(e) => {
                debug!("send click on {} ignored: {}", session_id, e);
                return None;
            }
        };
        self.store.send_in_progress = true;

        // the host may rewrite the body on this same turn; read it now
        let snapshot = session
            .body_node
            .and_then(|id| doc.get(id))
            .map(body_markup)
            .unwrap_or_default();
        session.body_snapshot = Some(snapshot.clone());

        info!(
            "send triggered for {} (body_len={})",
            session_id,
            snapshot.len()
        );
        Some(SendTrigger {
            root: doc.get(session.root),
            session_id,
            body_snapshot: snapshot,
        })
    }
}
