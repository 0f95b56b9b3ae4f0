use super::*;
use crate::store::{ClickEvent, OpenEvent};
use axum::body::Body;
use axum::http::Request;
use std::sync::Mutex;
use tower::ServiceExt;

const SECRET: &str = "gateway-test-secret";

fn make_state() -> AppState {
    let db = Arc::new(TrackingDb::in_memory().unwrap());
    AppState::new(db, JwtKeys::new(SECRET).unwrap(), "http://t.example/")
}

fn bearer(user: &str) -> String {
    let token = JwtKeys::new(SECRET).unwrap().issue(user, None).unwrap();
    format!("Bearer {}", token)
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 64 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut req = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

/// Event log that refuses every write.
struct BrokenLog;

impl EventLog for BrokenLog {
    fn append_open(&self, _event: &OpenEvent) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
    fn append_click(&self, _event: &ClickEvent) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

/// Event log that remembers what it was given.
#[derive(Default)]
struct RecordingLog {
    opens: Mutex<Vec<OpenEvent>>,
    clicks: Mutex<Vec<ClickEvent>>,
}

impl EventLog for RecordingLog {
    fn append_open(&self, event: &OpenEvent) -> anyhow::Result<()> {
        self.opens.lock().unwrap().push(event.clone());
        Ok(())
    }
    fn append_click(&self, event: &ClickEvent) -> anyhow::Result<()> {
        self.clicks.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_health_endpoint_returns_json() {
    let resp = get(build_router(make_state()), "/_health", &[]).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], crate::VERSION);
}

#[test]
fn test_public_base_url_trailing_slash_trimmed() {
    assert_eq!(make_state().public_base_url, "http://t.example");
}

#[tokio::test]
async fn test_pixel_serves_png_with_no_cache_headers() {
    let state = make_state();
    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..state
    };
    let resp = get(
        build_router(state),
        "/t/pixel/e1/tok1.png",
        &[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("user-agent", "MailClient/1.0"),
        ],
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");
    assert_eq!(body_bytes(resp).await, tracking::PIXEL_PNG.to_vec());

    let opens = log.opens.lock().unwrap();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].email_id, "e1");
    assert_eq!(opens[0].recipient_token, "tok1");
    assert_eq!(opens[0].origin.ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(opens[0].origin.user_agent.as_deref(), Some("MailClient/1.0"));
}

#[tokio::test]
async fn test_pixel_fails_open_when_recording_fails() {
    let state = AppState {
        events: Arc::new(BrokenLog),
        ..make_state()
    };
    let resp = get(build_router(state), "/t/pixel/e1/tok1.png", &[]).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, tracking::PIXEL_PNG.to_vec());
}

#[tokio::test]
async fn test_click_redirects_and_records() {
    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..make_state()
    };
    let resp = get(
        build_router(state),
        "/t/click/e1/tok1/aHR0cDovL2V4YW1wbGUuY29t",
        &[],
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://example.com");
    let clicks = log.clicks.lock().unwrap();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].url, "http://example.com");
    assert_eq!(clicks[0].recipient_token, "tok1");
    assert!(clicks[0].origin.ip.is_none());
}

#[tokio::test]
async fn test_click_percent_encoded_target() {
    let resp = get(
        build_router(make_state()),
        "/t/click/e1/tok1/example.com%2Fpath",
        &[],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://example.com/path");
}

#[tokio::test]
async fn test_click_fails_open_when_recording_fails() {
    let state = AppState {
        events: Arc::new(BrokenLog),
        ..make_state()
    };
    let resp = get(
        build_router(state),
        "/t/click/e1/tok1/aHR0cDovL2V4YW1wbGUuY29t",
        &[],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://example.com");
}

#[tokio::test]
async fn test_stats_require_bearer() {
    let app = build_router(make_state());
    for uri in [
        "/api/stats/summary",
        "/api/stats/emails",
        "/api/stats/email/e1/recipients",
    ] {
        let resp = get(app.clone(), uri, &[]).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["message"], "Unauthorized");
    }
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let foreign = JwtKeys::new("someone-else").unwrap().issue("u1", None).unwrap();
    let auth = format!("Bearer {}", foreign);
    let resp = get(
        build_router(make_state()),
        "/api/stats/summary",
        &[("authorization", auth.as_str())],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_summary_with_valid_bearer() {
    let auth = bearer("u1");
    let resp = get(
        build_router(make_state()),
        "/api/stats/summary",
        &[("authorization", auth.as_str())],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"ok": true, "totalOpens": 0, "totalClicks": 0})
    );
}

#[test]
fn test_internal_error_hides_detail() {
    let resp = ApiError::Internal(anyhow::anyhow!("sqlite exploded")).into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_auth_error_maps_to_unauthorized() {
    let err = ApiError::from(MailTraceError::Auth("bad signature".into()));
    assert!(matches!(err, ApiError::Unauthorized));
}

#[tokio::test]
async fn test_start_binds_ephemeral_port() {
    let (handle, addr) = start("127.0.0.1", 0, make_state()).await.unwrap();
    assert_ne!(addr.port(), 0);
    handle.abort();
}

#[test]
fn test_storage_error_maps_to_internal() {
    let err = ApiError::from(MailTraceError::Storage("disk full".into()));
    assert!(matches!(err, ApiError::Internal(_)));
    assert_eq!(
        err.into_response().status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_click_with_undecodable_target_redirects_to_root() {
    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..make_state()
    };
    let resp = get(build_router(state), "/t/click/e1/tok1/%FF", &[]).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/");
    let clicks = log.clicks.lock().unwrap();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].email_id, "e1");
    assert_eq!(clicks[0].recipient_token, "tok1");
    assert_eq!(clicks[0].url, "/");
}

#[tokio::test]
async fn test_click_with_undecodable_token_still_redirects() {
    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..make_state()
    };
    let resp = get(
        build_router(state),
        "/t/click/e1/%FF%FE/aHR0cDovL2V4YW1wbGUuY29t",
        &[],
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://example.com");
    assert_eq!(log.clicks.lock().unwrap()[0].recipient_token, "\u{FFFD}\u{FFFD}");
}

#[tokio::test]
async fn test_pixel_with_undecodable_id_still_served() {
    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..make_state()
    };
    let resp = get(build_router(state), "/t/pixel/%FF/tok1.png", &[]).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(resp).await, tracking::PIXEL_PNG.to_vec());
    let opens = log.opens.lock().unwrap();
    assert_eq!(opens[0].email_id, "\u{FFFD}");
    assert_eq!(opens[0].recipient_token, "tok1");
}

#[tokio::test]
async fn test_click_location_is_ascii_for_unicode_target() {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let log = Arc::new(RecordingLog::default());
    let state = AppState {
        events: log.clone(),
        ..make_state()
    };
    let encoded = URL_SAFE_NO_PAD.encode("https://example.com/café");
    let resp = get(
        build_router(state),
        &format!("/t/click/e1/tok1/{}", encoded),
        &[],
    )
    .await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(location, "https://example.com/caf%C3%A9");
    assert_eq!(log.clicks.lock().unwrap()[0].url, "https://example.com/café");
}
