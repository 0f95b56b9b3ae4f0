//! Pixel and click endpoints. Both fail open: the image or redirect is
//! served whether or not the hit could be recorded.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use chrono::Utc;
use tracing::{debug, warn};

use super::{AppState, Origin};
use crate::store::{ClickEvent, OpenEvent};

/// 1x1 transparent PNG.
pub static PIXEL_PNG: [u8; 68] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xb5,
    0x1c, 0x0c, 0x02, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60,
    0x60, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x2b, 0x09, 0x4d, 0x84, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Base64 in any of the common alphabets, padded or not, as UTF-8.
fn decode_base64(encoded: &str) -> Option<String> {
    [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Recover a redirect target from the last click-URL segment.
///
/// Percent-decoding wins when it yields an http(s) URL. Otherwise a base64
/// decoding that yields one is preferred, then the percent-decoded text. If
/// the text is not valid UTF-8 after percent-decoding, base64 is the only
/// fallback, and `/` the last. A missing scheme defaults to `http://`.
pub fn decode_target(encoded: &str) -> String {
    let target = match urlencoding::decode(encoded) {
        Ok(text) if has_http_scheme(&text) => return text.into_owned(),
        Ok(text) => decode_base64(encoded)
            .filter(|url| has_http_scheme(url))
            .unwrap_or_else(|| text.into_owned()),
        Err(_) => decode_base64(encoded).unwrap_or_else(|| "/".to_string()),
    };
    let target = target.trim();
    if target.is_empty() || target == "/" {
        "/".to_string()
    } else if has_http_scheme(target) {
        target.to_string()
    } else {
        format!("http://{}", target)
    }
}

/// The last `N` raw segments of the request path, still percent-encoded.
fn trailing_segments<const N: usize>(uri: &Uri) -> [String; N] {
    let mut segments = uri.path().rsplit('/');
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for slot in out.iter_mut().rev() {
        *slot = segments.next().unwrap_or_default().to_string();
    }
    out
}

/// Percent-decode, replacing invalid UTF-8 instead of rejecting it.
fn decode_lossy(segment: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned()
}

/// `Location` value for a decoded target. ASCII targets pass through
/// verbatim; anything else is re-serialized by `url`, which percent-encodes
/// non-ASCII. Falls back to `/`.
fn location_header(target: &str) -> HeaderValue {
    let encoded = if target.is_ascii() {
        None
    } else {
        url::Url::parse(target).ok().map(String::from)
    };
    HeaderValue::from_str(encoded.as_deref().unwrap_or(target)).unwrap_or_else(|_| {
        warn!("click target is not a valid header value, redirecting to /");
        HeaderValue::from_static("/")
    })
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        PIXEL_PNG.as_slice(),
    )
        .into_response()
}

/// GET /t/pixel/{email_id}/{token}.png
pub(super) async fn pixel_handler(
    State(state): State<AppState>,
    uri: Uri,
    params: Result<Path<(String, String)>, PathRejection>,
    Origin(origin): Origin,
) -> Response {
    let (email_id, file) = match params {
        Ok(Path(params)) => params,
        Err(e) => {
            debug!("pixel path rejected ({}), decoding lossily", e);
            let [email_id, file] = trailing_segments::<2>(&uri);
            (decode_lossy(&email_id), decode_lossy(&file))
        }
    };
    let token = file.strip_suffix(".png").unwrap_or(&file);
    let event = OpenEvent {
        email_id,
        recipient_token: token.to_string(),
        at: Utc::now(),
        origin,
    };
    match state.events.append_open(&event) {
        Ok(()) => debug!("open recorded: email={} token={}", event.email_id, token),
        Err(e) => warn!("failed to record open for {}: {:#}", event.email_id, e),
    }
    pixel_response()
}

/// GET /t/click/{email_id}/{token}/{encoded}
pub(super) async fn click_handler(
    State(state): State<AppState>,
    uri: Uri,
    params: Result<Path<(String, String, String)>, PathRejection>,
    Origin(origin): Origin,
) -> Response {
    // On rejection the raw target goes to `decode_target`, which owns the
    // invalid-UTF-8 fallback.
    let (email_id, token, url) = match params {
        Ok(Path((email_id, token, encoded))) => (email_id, token, decode_target(&encoded)),
        Err(e) => {
            debug!("click path rejected ({}), decoding lossily", e);
            let [email_id, token, encoded] = trailing_segments::<3>(&uri);
            (
                decode_lossy(&email_id),
                decode_lossy(&token),
                decode_target(&encoded),
            )
        }
    };
    let location = location_header(&url);

    let event = ClickEvent {
        email_id,
        recipient_token: token,
        url,
        at: Utc::now(),
        origin,
    };
    match state.events.append_click(&event) {
        Ok(()) => debug!("click recorded: email={} url={}", event.email_id, event.url),
        Err(e) => warn!("failed to record click for {}: {:#}", event.email_id, e),
    }

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
