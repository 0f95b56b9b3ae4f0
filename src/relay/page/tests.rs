use super::*;
use crate::errors::RelayFailure;

fn relay(timeout_ms: u64) -> (Arc<PageRelay>, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(PageRelay::new(tx, Duration::from_millis(timeout_ms))),
        rx,
    )
}

fn payload(id: &str) -> SendPayload {
    SendPayload {
        compose_id: id.into(),
        subject: "s".into(),
        recipients: vec!["a@x.com".into()],
        body_markup: String::new(),
    }
}

#[tokio::test]
async fn test_create_matched_by_compose_id() {
    let (page, mut to_bridge) = relay(4500);
    let waiter = {
        let page = page.clone();
        tokio::spawn(async move { page.create_email(payload("c_1")).await })
    };

    let posted = to_bridge.recv().await.unwrap();
    assert_eq!(posted.source, Layer::Page);
    assert!(matches!(posted.message, RelayMessage::ComposeSend(ref p) if p.compose_id == "c_1"));

    // an unrelated reply and a page-sourced echo are both ignored
    page.dispatch(Envelope::new(
        Layer::Bridge,
        RelayMessage::CreateResponse {
            compose_id: "c_other".into(),
            resp: CreateEmailResult::default(),
        },
    ));
    page.dispatch(Envelope::new(
        Layer::Page,
        RelayMessage::CreateResponse {
            compose_id: "c_1".into(),
            resp: CreateEmailResult::failure(RelayFailure::Timeout),
        },
    ));
    page.dispatch(Envelope::new(
        Layer::Bridge,
        RelayMessage::CreateResponse {
            compose_id: "c_1".into(),
            resp: CreateEmailResult::success(CreatedEmail {
                email_id: "e1".into(),
                pixel_url: None,
            }),
        },
    ));

    let created = waiter.await.unwrap().unwrap();
    assert_eq!(created.email_id, "e1");
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
async fn test_explicit_failure_resolves_none() {
    let (page, mut to_bridge) = relay(4500);
    let waiter = {
        let page = page.clone();
        tokio::spawn(async move { page.create_email(payload("c_2")).await })
    };
    to_bridge.recv().await.unwrap();
    page.dispatch(Envelope::new(
        Layer::Bridge,
        RelayMessage::CreateResponse {
            compose_id: "c_2".into(),
            resp: CreateEmailResult::failure(RelayFailure::Unauthorized),
        },
    ));
    assert!(waiter.await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_reply_times_out() {
    let (page, _to_bridge) = relay(4500);
    let started = tokio::time::Instant::now();
    assert!(page.create_email(payload("c_3")).await.is_none());
    assert!(started.elapsed() <= Duration::from_millis(4600));
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
async fn test_closed_bridge_fails_fast() {
    let (page, to_bridge) = relay(60_000);
    drop(to_bridge);
    assert!(page.create_email(payload("c_4")).await.is_none());
    assert!(page.rewrite_link("e1", "https://a.io").await.is_none());
    assert_eq!(page.pending_count(), 0);
}

#[tokio::test]
async fn test_rewrite_round_trip() {
    let (page, mut to_bridge) = relay(4500);
    let waiter = {
        let page = page.clone();
        tokio::spawn(async move { page.rewrite_link("e1", "https://a.io").await })
    };
    let posted = to_bridge.recv().await.unwrap();
    let RelayMessage::RewriteLink {
        request_id,
        email_id,
        url,
    } = posted.message
    else {
        panic!("expected rewrite request");
    };
    assert_eq!(email_id, "e1");
    page.dispatch(Envelope::new(
        Layer::Bridge,
        RelayMessage::RewriteResponse {
            request_id,
            original: url,
            rewritten: Some("http://t/click/e1/tok/x".into()),
        },
    ));
    assert_eq!(
        waiter.await.unwrap().as_deref(),
        Some("http://t/click/e1/tok/x")
    );
}

#[tokio::test]
async fn test_tracking_set_updates_flag() {
    let (page, _rx) = relay(4500);
    let flag = page.tracking_flag();
    assert!(flag.load(Ordering::Relaxed));
    page.dispatch(Envelope::new(
        Layer::Bridge,
        RelayMessage::TrackingSet { enabled: false },
    ));
    assert!(!flag.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_announce_ready_posts_envelope() {
    let (page, mut to_bridge) = relay(4500);
    page.announce_ready(ComposeReady {
        compose_id: "c_5".into(),
        subject: String::new(),
        recipients: vec![],
    });
    let posted = to_bridge.recv().await.unwrap();
    assert_eq!(posted.message.kind(), "compose:ready");
}
