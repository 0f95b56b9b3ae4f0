use super::*;
use crate::relay::background::{BackendApi, Background, CreateEmailRequest};
use crate::relay::protocol::CreatedEmail;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingApi {
    creates: AtomicUsize,
}

#[async_trait]
impl BackendApi for CountingApi {
    async fn create_email(
        &self,
        credential: &str,
        _request: &CreateEmailRequest,
    ) -> Result<CreatedEmail, RelayFailure> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if credential == "expired" {
            return Err(RelayFailure::Unauthorized);
        }
        Ok(CreatedEmail {
            email_id: "e1".into(),
            pixel_url: None,
        })
    }

    async fn rewrite_link(
        &self,
        _credential: &str,
        _email_id: &str,
        _url: &str,
    ) -> Result<String, RelayFailure> {
        Err(RelayFailure::HttpError(404))
    }
}

fn bridge(
    api: Arc<CountingApi>,
    credential: Option<&str>,
) -> (Bridge, mpsc::UnboundedReceiver<Envelope>) {
    let (to_page, from_bridge) = mpsc::unbounded_channel();
    let (handle, _task) = Background::spawn(api);
    let bridge = Bridge::new(
        to_page,
        handle,
        CredentialStore::new(credential.map(str::to_string)),
        Duration::from_secs(1),
    );
    (bridge, from_bridge)
}

fn send(id: &str) -> RelayMessage {
    RelayMessage::ComposeSend(SendPayload {
        compose_id: id.into(),
        ..SendPayload::default()
    })
}

#[tokio::test]
async fn test_missing_credential_short_circuits() {
    let api = Arc::new(CountingApi::default());
    let (bridge, mut to_page) = bridge(api.clone(), None);

    bridge.handle(send("c_1")).await;
    let reply = to_page.recv().await.unwrap();
    assert_eq!(reply.source, Layer::Bridge);
    let RelayMessage::CreateResponse { compose_id, resp } = reply.message else {
        panic!("expected create response");
    };
    assert_eq!(compose_id, "c_1");
    assert_eq!(resp.error, Some(RelayFailure::NoToken));
    assert_eq!(api.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_credential_attached_and_result_relayed() {
    let api = Arc::new(CountingApi::default());
    let (bridge, mut to_page) = bridge(api.clone(), Some("tok"));

    bridge.handle(send("c_2")).await;
    let RelayMessage::CreateResponse { resp, .. } = to_page.recv().await.unwrap().message else {
        panic!("expected create response");
    };
    assert!(resp.ok);
    assert_eq!(resp.email_id.as_deref(), Some("e1"));
    assert_eq!(api.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unauthorized_surfaces_as_typed_failure() {
    let api = Arc::new(CountingApi::default());
    let (bridge, mut to_page) = bridge(api, Some("expired"));

    bridge.handle(send("c_3")).await;
    let RelayMessage::CreateResponse { resp, .. } = to_page.recv().await.unwrap().message else {
        panic!("expected create response");
    };
    assert!(!resp.ok);
    assert_eq!(resp.error.map(|e| e.code()), Some("unauthorized"));
}

#[tokio::test]
async fn test_failed_rewrite_replies_null() {
    let api = Arc::new(CountingApi::default());
    let (bridge, mut to_page) = bridge(api, Some("tok"));

    bridge
        .handle(RelayMessage::RewriteLink {
            request_id: "r1".into(),
            email_id: "e1".into(),
            url: "https://a.io".into(),
        })
        .await;
    assert_eq!(
        to_page.recv().await.unwrap().message,
        RelayMessage::RewriteResponse {
            request_id: "r1".into(),
            original: "https://a.io".into(),
            rewritten: None,
        }
    );
}

#[tokio::test]
async fn test_tracking_toggle_posted_to_page() {
    let (bridge, mut to_page) = bridge(Arc::new(CountingApi::default()), None);
    bridge.set_tracking_enabled(false);
    assert_eq!(
        to_page.recv().await.unwrap().message,
        RelayMessage::TrackingSet { enabled: false }
    );
}

#[tokio::test]
async fn test_spawned_bridge_ignores_non_page_sources() {
    let (bridge, mut to_page) = bridge(Arc::new(CountingApi::default()), None);
    let (tx, rx) = mpsc::unbounded_channel();
    let task = Arc::new(bridge).spawn(rx);

    tx.send(Envelope::new(Layer::Bridge, send("echo"))).unwrap();
    tx.send(Envelope::new(Layer::Page, send("c_4"))).unwrap();
    let reply = to_page.recv().await.unwrap();
    assert!(matches!(
        reply.message,
        RelayMessage::CreateResponse { ref compose_id, .. } if compose_id == "c_4"
    ));
    drop(tx);
    task.await.unwrap();
}
