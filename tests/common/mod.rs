// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use mailtrace::auth::JwtKeys;
use mailtrace::compose::snapshot::{DocumentSnapshot, DomNode, NodeId, Rect};
use mailtrace::gateway::AppState;
use mailtrace::store::TrackingDb;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const SECRET: &str = "integration-secret";

/// A backend bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub db: Arc<TrackingDb>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let db = Arc::new(TrackingDb::in_memory().unwrap());
        // reserve a port up front so generated URLs point back at this server
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let base = format!("http://127.0.0.1:{}", port);
        let state = AppState::new(db.clone(), JwtKeys::new(SECRET).unwrap(), &base);
        let (handle, addr) = mailtrace::gateway::start("127.0.0.1", port, state)
            .await
            .unwrap();
        Self { addr, db, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn token_for(user: &str) -> String {
    JwtKeys::new(SECRET).unwrap().issue(user, None).unwrap()
}

/// Client that reports redirects instead of following them.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// A compose dialog: subject input, recipient chips, body editor, send button
/// at `base + 3`.
pub fn compose_window(base: NodeId, subject: &str, recipients: &[&str], body: &str) -> DomNode {
    let mut window = DomNode::new(base, "div")
        .with_attr("role", "dialog")
        .with_rect(Rect::new(0.0, 0.0, 400.0, 500.0))
        .child(
            DomNode::new(base + 1, "input")
                .with_attr("name", "subjectbox")
                .with_value(subject),
        )
        .child(
            DomNode::new(base + 2, "div")
                .with_attr("aria-label", "Message Body")
                .with_attr("contenteditable", "true")
                .with_html(body),
        )
        .child(
            DomNode::new(base + 3, "div")
                .with_attr("role", "button")
                .with_attr("aria-label", "Send"),
        );
    for (i, address) in recipients.iter().enumerate() {
        window = window.child(
            DomNode::new(base + 10 + i as NodeId, "span")
                .with_attr("email", address)
                .with_text(address),
        );
    }
    window
}

pub fn page(children: Vec<DomNode>) -> DocumentSnapshot {
    let mut root = DomNode::new(0, "body");
    root.children = children;
    DocumentSnapshot::new(root)
}
