//! Page-side compose tracking.
//!
//! Works over [`snapshot::DocumentSnapshot`]s of the host document rather
//! than live handles; every heuristic is a pure function of a snapshot.

pub mod classify;
pub mod driver;
pub mod extract;
pub mod monitor;
pub mod send_button;
pub mod snapshot;
pub mod state;
