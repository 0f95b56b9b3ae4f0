//! Cross-context message envelopes.
//!
//! Every message carries the layer that posted it (`source`) and a `type`
//! discriminator. Receivers only accept replies tagged with the layer they
//! expect, so a context never mistakes its own echoed post for a reply.

use serde::{Deserialize, Serialize};

use crate::errors::RelayFailure;
use crate::interceptor::SendPayload;

/// Which execution context posted a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    #[serde(rename = "mailtrace-page")]
    Page,
    #[serde(rename = "mailtrace-bridge")]
    Bridge,
    #[serde(rename = "mailtrace-background")]
    Background,
}

/// Informational announcement posted when a session registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeReady {
    pub compose_id: String,
    pub subject: String,
    pub recipients: Vec<String>,
}

/// Outcome of a create-message round trip as seen by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RelayFailure>,
}

impl CreateEmailResult {
    pub fn success(created: CreatedEmail) -> Self {
        Self {
            ok: true,
            email_id: Some(created.email_id),
            pixel_url: created.pixel_url,
            error: None,
        }
    }

    pub fn failure(error: RelayFailure) -> Self {
        Self {
            ok: false,
            email_id: None,
            pixel_url: None,
            error: Some(error),
        }
    }

    /// The created message, if the round trip fully succeeded.
    pub fn into_created(self) -> Option<CreatedEmail> {
        match (self.ok, self.email_id) {
            (true, Some(email_id)) if !email_id.is_empty() => Some(CreatedEmail {
                email_id,
                pixel_url: self.pixel_url,
            }),
            _ => None,
        }
    }
}

/// Identifier (and pixel location) returned by the backend for a new message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEmail {
    pub email_id: String,
    #[serde(default)]
    pub pixel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "compose:ready")]
    ComposeReady(ComposeReady),
    #[serde(rename = "compose:send")]
    ComposeSend(SendPayload),
    #[serde(rename = "email:create:response", rename_all = "camelCase")]
    CreateResponse {
        compose_id: String,
        resp: CreateEmailResult,
    },
    #[serde(rename = "compose:rewriteLink", rename_all = "camelCase")]
    RewriteLink {
        request_id: String,
        email_id: String,
        url: String,
    },
    #[serde(rename = "link:rewrite:response", rename_all = "camelCase")]
    RewriteResponse {
        request_id: String,
        original: String,
        rewritten: Option<String>,
    },
    #[serde(rename = "tracking:set")]
    TrackingSet { enabled: bool },
}

impl RelayMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ComposeReady(_) => "compose:ready",
            Self::ComposeSend(_) => "compose:send",
            Self::CreateResponse { .. } => "email:create:response",
            Self::RewriteLink { .. } => "compose:rewriteLink",
            Self::RewriteResponse { .. } => "link:rewrite:response",
            Self::TrackingSet { .. } => "tracking:set",
        }
    }
}

/// A message as posted across a context boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: Layer,
    #[serde(flatten)]
    pub message: RelayMessage,
}

impl Envelope {
    pub fn new(source: Layer, message: RelayMessage) -> Self {
        Self { source, message }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
