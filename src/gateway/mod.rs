pub mod api;
pub mod tracking;

/// Backend HTTP surface.
///
/// Unauthenticated tracking endpoints (`/t/pixel`, `/t/click`) that never
/// fail towards the mail client, plus bearer-authenticated JSON endpoints for
/// message creation, link rewriting and stats.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::auth::JwtKeys;
use crate::errors::MailTraceError;
use crate::store::{EventLog, OriginMeta, TrackingDb};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<TrackingDb>,
    /// Where tracking hits are appended. Usually the same database as `db`.
    pub events: Arc<dyn EventLog>,
    pub jwt: Arc<JwtKeys>,
    /// Base for pixel and click URLs handed back to clients, without a
    /// trailing slash.
    pub public_base_url: String,
}

impl AppState {
    pub fn new(db: Arc<TrackingDb>, jwt: JwtKeys, public_base_url: &str) -> Self {
        Self {
            events: db.clone(),
            db,
            jwt: Arc::new(jwt),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Error body for the authenticated endpoints: `{ok: false, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<MailTraceError> for ApiError {
    fn from(err: MailTraceError) -> Self {
        match err {
            MailTraceError::Auth(reason) => {
                debug!("rejected credential: {}", reason);
                Self::Unauthorized
            }
            MailTraceError::Internal(e) => Self::Internal(e),
            MailTraceError::Storage(reason) => {
                Self::Internal(anyhow::anyhow!("storage unavailable: {}", reason))
            }
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(e) => {
                error!("request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorBody {
                ok: false,
                message,
            }),
        )
            .into_response()
    }
}

/// The user id from a verified bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let user = state.jwt.authenticate(header)?;
        Ok(Self(user))
    }
}

/// Origin of a tracking hit: first `x-forwarded-for` hop, else the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin(pub OriginMeta);

impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self(OriginMeta { ip, user_agent }))
    }
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(health_handler))
        .route("/t/pixel/{email_id}/{file}", get(tracking::pixel_handler))
        .route(
            "/t/click/{email_id}/{token}/{encoded}",
            get(tracking::click_handler),
        )
        .route("/api/emails", post(api::create_email_handler))
        .route("/api/redirect/rewrite", post(api::rewrite_link_handler))
        .route("/api/stats/summary", get(api::summary_handler))
        .route("/api/stats/emails", get(api::emails_handler))
        .route(
            "/api/stats/email/{email_id}/recipients",
            get(api::recipients_handler),
        )
        .with_state(state)
}

/// GET /_health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Bind and serve until the task is aborted or the listener fails.
pub async fn start(
    host: &str,
    port: u16,
    state: AppState,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    info!("tracking backend listening on {}", local);

    let handle = tokio::spawn(async move {
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!("HTTP server error: {}", e);
        }
    });

    Ok((handle, local))
}

#[cfg(test)]
mod tests;
