//! Long-lived background hop: owns the backend HTTP client.
//!
//! Requests arrive with everything they need (credential included); the
//! background keeps no per-user state, so concurrent sends never share a
//! "current token".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::{ComposeReady, CreatedEmail};
use crate::errors::RelayFailure;
use crate::injector::{extract_links, is_trackable};
use crate::interceptor::SendPayload;

/// Queue depth between the bridge and the background.
const CALL_QUEUE: usize = 64;

/// `POST /api/emails` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailRequest {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body_html: String,
    pub links: Vec<String>,
}

impl CreateEmailRequest {
    pub fn from_payload(payload: &SendPayload) -> Self {
        let links = extract_links(&payload.body_markup)
            .into_iter()
            .map(|l| l.href)
            .filter(|href| is_trackable(href))
            .collect();
        Self {
            subject: payload.subject.clone(),
            recipients: payload.recipients.clone(),
            body_html: payload.body_markup.clone(),
            links,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEmailResponse {
    #[serde(default)]
    ok: bool,
    email_id: Option<String>,
    pixel_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    #[serde(default)]
    ok: bool,
    rewritten_url: Option<String>,
}

/// The backend calls the background performs.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn create_email(
        &self,
        credential: &str,
        request: &CreateEmailRequest,
    ) -> Result<CreatedEmail, RelayFailure>;

    async fn rewrite_link(
        &self,
        credential: &str,
        email_id: &str,
        url: &str,
    ) -> Result<String, RelayFailure>;
}

/// [`BackendApi`] over HTTP with bearer credentials.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        route: &str,
        credential: &str,
        body: &B,
    ) -> Result<R, RelayFailure> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, route))
            .bearer_auth(credential)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayFailure::Timeout
                } else {
                    RelayFailure::NetworkError(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RelayFailure::Unauthorized);
        }
        if !status.is_success() {
            return Err(RelayFailure::HttpError(status.as_u16()));
        }
        resp.json::<R>()
            .await
            .map_err(|e| RelayFailure::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn create_email(
        &self,
        credential: &str,
        request: &CreateEmailRequest,
    ) -> Result<CreatedEmail, RelayFailure> {
        let resp: CreateEmailResponse = self.post_json("/api/emails", credential, request).await?;
        match resp.email_id {
            Some(email_id) if resp.ok && !email_id.is_empty() => Ok(CreatedEmail {
                email_id,
                pixel_url: resp.pixel_url,
            }),
            _ => Err(RelayFailure::BadResponse("missing emailId".into())),
        }
    }

    async fn rewrite_link(
        &self,
        credential: &str,
        email_id: &str,
        url: &str,
    ) -> Result<String, RelayFailure> {
        let body = serde_json::json!({ "emailId": email_id, "originalUrl": url });
        let resp: RewriteResponse = self
            .post_json("/api/redirect/rewrite", credential, &body)
            .await?;
        match resp.rewritten_url {
            Some(rewritten) if resp.ok && !rewritten.is_empty() => Ok(rewritten),
            _ => Err(RelayFailure::BadResponse("missing rewrittenUrl".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BackgroundRequest {
    ComposeReady(ComposeReady),
    CreateEmail {
        credential: String,
        payload: SendPayload,
    },
    RewriteLink {
        credential: String,
        email_id: String,
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundReply {
    Created(Result<CreatedEmail, RelayFailure>),
    Rewritten(Result<String, RelayFailure>),
}

struct BackgroundCall {
    request: BackgroundRequest,
    reply: Option<oneshot::Sender<BackgroundReply>>,
}

/// Sending side of the background queue.
#[derive(Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<BackgroundCall>,
}

impl BackgroundHandle {
    /// Send a request and wait up to `timeout` for its reply.
    pub async fn call(
        &self,
        request: BackgroundRequest,
        timeout: Duration,
    ) -> Result<BackgroundReply, RelayFailure> {
        let (tx, rx) = oneshot::channel();
        let call = BackgroundCall {
            request,
            reply: Some(tx),
        };
        let exchange = async {
            if self.tx.send(call).await.is_err() {
                return Err(RelayFailure::NetworkError("background unavailable".into()));
            }
            rx.await
                .map_err(|_| RelayFailure::BadResponse("background dropped reply".into()))
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RelayFailure::Timeout),
        }
    }

    /// Fire-and-forget; dropped with a warning when the queue is full.
    pub fn notify(&self, request: BackgroundRequest) {
        let call = BackgroundCall {
            request,
            reply: None,
        };
        if let Err(e) = self.tx.try_send(call) {
            warn!("background notify dropped: {}", e);
        }
    }
}

pub struct Background;

impl Background {
    /// Start the background loop. Each call is served on its own task.
    pub fn spawn(api: Arc<dyn BackendApi>) -> (BackgroundHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<BackgroundCall>(CALL_QUEUE);
        let task = tokio::spawn(async move {
            while let Some(call) = rx.recv().await {
                let api = api.clone();
                tokio::spawn(async move {
                    let reply = serve(api.as_ref(), call.request).await;
                    if let (Some(tx), Some(reply)) = (call.reply, reply)
                        && tx.send(reply).is_err()
                    {
                        debug!("background reply receiver gone");
                    }
                });
            }
            debug!("background queue closed");
        });
        (BackgroundHandle { tx }, task)
    }
}

async fn serve(api: &dyn BackendApi, request: BackgroundRequest) -> Option<BackgroundReply> {
    match request {
        BackgroundRequest::ComposeReady(ready) => {
            info!(
                "compose ready: {} ({} recipients)",
                ready.compose_id,
                ready.recipients.len()
            );
            None
        }
        BackgroundRequest::CreateEmail {
            credential,
            payload,
        } => {
            let request = CreateEmailRequest::from_payload(&payload);
            let result = api.create_email(&credential, &request).await;
            if let Err(e) = &result {
                warn!("create email for {} failed: {}", payload.compose_id, e);
            }
            Some(BackgroundReply::Created(result))
        }
        BackgroundRequest::RewriteLink {
            credential,
            email_id,
            url,
        } => {
            let result = api.rewrite_link(&credential, &email_id, &url).await;
            if let Err(e) = &result {
                debug!("rewrite of {} failed: {}", url, e);
            }
            Some(BackgroundReply::Rewritten(result))
        }
    }
}
