//! Compose-session lifecycle as a pure transition function.
//!
//! `Candidate → Registered → SendTriggered → TornDown`, with teardown
//! reachable from every live state.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComposeState {
    Candidate,
    Registered,
    SendTriggered,
    TornDown,
}

impl ComposeState {
    /// Registered-or-later live states; at most one session may be in one.
    pub fn holds_primary(self) -> bool {
        matches!(self, Self::Registered | Self::SendTriggered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeEvent {
    /// Passed the registration gate.
    Promote,
    /// The classified send control was clicked.
    SendClicked,
    /// The root node is no longer in the document.
    RootDetached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid compose transition: {event:?} in state {state:?}")]
pub struct InvalidTransition {
    pub state: ComposeState,
    pub event: ComposeEvent,
}

pub fn transition(
    state: ComposeState,
    event: ComposeEvent,
) -> Result<ComposeState, InvalidTransition> {
    use ComposeEvent::{Promote, RootDetached, SendClicked};
    use ComposeState::{Candidate, Registered, SendTriggered, TornDown};

    match (state, event) {
        (Candidate, Promote) => Ok(Registered),
        (Registered, SendClicked) => Ok(SendTriggered),
        (Candidate | Registered | SendTriggered, RootDetached) => Ok(TornDown),
        _ => Err(InvalidTransition { state, event }),
    }
}

/// Why a candidate surface was not promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Zero-size or display:none clone.
    Hidden,
    /// Another session already holds the primary slot.
    SecondarySurface,
    /// A send is in flight; surfaces the host spawns afterwards are ignored.
    SendInProgress,
}

/// Facts the registration decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationGate {
    pub visible: bool,
    pub primary_held: bool,
    pub send_in_progress: bool,
}

/// Whether a candidate may be promoted; checks run in a fixed order so the
/// reported reason is deterministic.
pub fn admit(gate: RegistrationGate) -> Result<(), IgnoreReason> {
    if !gate.visible {
        return Err(IgnoreReason::Hidden);
    }
    if gate.send_in_progress {
        return Err(IgnoreReason::SendInProgress);
    }
    if gate.primary_held {
        return Err(IgnoreReason::SecondarySurface);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
