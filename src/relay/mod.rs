//! Cross-context relay.
//!
//! Three hops, each a request/response pair with a bounded wait:
//!
//! - `page`: posts envelopes from the page context and matches replies by
//!   correlation id (the compose session id, or a per-link request id)
//! - `bridge`: relays page envelopes to the background, attaching the shared
//!   credential, and posts replies back
//! - `background`: performs the backend HTTP calls
//!
//! A timeout anywhere resolves to "no result"; callers treat that exactly
//! like an explicit failure.

pub mod background;
pub mod bridge;
pub mod credential;
pub mod page;
pub mod pending;
pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::compose::driver::PageDriver;
use crate::config::ClientConfig;
use crate::interceptor::SendPayload;
use background::{BackendApi, Background, BackgroundHandle, HttpBackend};
use bridge::Bridge;
use credential::CredentialStore;
use page::PageRelay;
use protocol::{ComposeReady, CreatedEmail};

/// Default bound on each relay hop.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_millis(4500);

/// What the page side needs from the relay chain.
#[async_trait]
pub trait TrackingRelay: Send + Sync {
    /// Create the backend message for one send. `None` on failure or timeout.
    async fn create_email(&self, payload: SendPayload) -> Option<CreatedEmail>;

    /// Tracking URL for one link. `None` keeps the original.
    async fn rewrite_link(&self, email_id: &str, url: &str) -> Option<String>;

    /// Fire-and-forget registration notice.
    fn announce_ready(&self, _ready: ComposeReady) {}
}

/// A wired page → bridge → background chain.
pub struct RelayStack {
    pub page: Arc<PageRelay>,
    pub bridge: Arc<Bridge>,
    pub background: BackgroundHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayStack {
    /// Spawn all three hops over in-process channels.
    pub fn spawn(api: Arc<dyn BackendApi>, credentials: CredentialStore, timeout: Duration) -> Self {
        let (to_bridge, from_page) = mpsc::unbounded_channel();
        let (to_page, from_bridge) = mpsc::unbounded_channel();

        let (background, background_task) = Background::spawn(api);
        let bridge = Arc::new(Bridge::new(to_page, background.clone(), credentials, timeout));
        let bridge_task = bridge.clone().spawn(from_page);
        let page = Arc::new(PageRelay::new(to_bridge, timeout));
        let page_task = page.spawn_dispatcher(from_bridge);

        Self {
            page,
            bridge,
            background,
            tasks: vec![background_task, bridge_task, page_task],
        }
    }

    /// Spawn the chain against `config.api_base_url`, seeded with the
    /// configured credential and tracking switch.
    pub fn from_config(config: &ClientConfig) -> Self {
        let api = Arc::new(HttpBackend::new(&config.api_base_url, config.relay_timeout()));
        let credential = Some(config.credential.clone()).filter(|c| !c.is_empty());
        let stack = Self::spawn(api, CredentialStore::new(credential), config.relay_timeout());
        stack.page.set_tracking_enabled(config.tracking_enabled);
        info!(
            "relay started: api={} timeout={}ms tracking={}",
            config.api_base_url, config.relay_timeout_ms, config.tracking_enabled
        );
        stack
    }

    /// A page driver bound to this chain's page relay.
    pub fn page_driver(&self, config: &ClientConfig) -> PageDriver {
        PageDriver::from_config(self.page.clone(), self.page.tracking_flag(), config)
    }

    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}
