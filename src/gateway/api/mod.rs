//! Authenticated JSON endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ApiError, AppState, AuthUser};
use crate::injector::is_trackable;
use crate::stats::{self, EmailsView, RecipientsView, SummaryView};
use crate::store::{EmailRecord, NewEmail};

/// Recipients as sent by clients: one address, or a list of addresses or
/// `{email}` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipientsField {
    One(String),
    Many(Vec<RecipientEntry>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecipientEntry {
    Address(String),
    Object {
        #[serde(default)]
        email: Option<String>,
    },
}

impl RecipientsField {
    fn into_addresses(self) -> Vec<String> {
        match self {
            Self::One(address) => vec![address],
            Self::Many(entries) => entries
                .into_iter()
                .filter_map(|entry| match entry {
                    RecipientEntry::Address(address) => Some(address),
                    RecipientEntry::Object { email } => email,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailBody {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub recipients: Option<RecipientsField>,
    #[serde(default)]
    pub to: Option<RecipientsField>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl CreateEmailBody {
    fn into_new_email(self, user_id: String) -> NewEmail {
        NewEmail {
            user_id,
            subject: self.subject.unwrap_or_default(),
            body_html: self
                .body_html
                .filter(|b| !b.is_empty())
                .or(self.body)
                .unwrap_or_default(),
            links: self.links,
            recipients: self
                .recipients
                .or(self.to)
                .map(RecipientsField::into_addresses)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipientView {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailResponse {
    pub ok: bool,
    pub email_id: String,
    pub recipients: Vec<RecipientView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteBody {
    pub email_id: String,
    pub original_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    pub ok: bool,
    pub original: String,
    pub rewritten_url: String,
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub(crate) fn pixel_url(base: &str, email: &EmailRecord) -> Option<String> {
    email
        .recipients
        .first()
        .map(|r| format!("{}/t/pixel/{}/{}.png", base, email.id, r.token))
}

pub(crate) fn click_url(base: &str, email_id: &str, token: &str, target: &str) -> String {
    format!(
        "{}/t/click/{}/{}/{}",
        base,
        email_id,
        token,
        URL_SAFE_NO_PAD.encode(target)
    )
}

/// POST /api/emails
pub(super) async fn create_email_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateEmailBody>, JsonRejection>,
) -> Result<Json<CreateEmailResponse>, ApiError> {
    let new = parse_body(payload)?.into_new_email(user_id);
    let email = state.db.create_email(&new)?;
    info!(
        "message created: id={} recipients={} links={}",
        email.id,
        email.recipients.len(),
        email.links.len()
    );

    let pixel_url = pixel_url(&state.public_base_url, &email);
    Ok(Json(CreateEmailResponse {
        ok: true,
        email_id: email.id,
        recipients: email
            .recipients
            .into_iter()
            .map(|r| RecipientView {
                email: r.email,
                token: r.token,
            })
            .collect(),
        pixel_url,
    }))
}

/// POST /api/redirect/rewrite
pub(super) async fn rewrite_link_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<RewriteBody>, JsonRejection>,
) -> Result<Json<RewriteResponse>, ApiError> {
    let body = parse_body(payload)?;
    let original = body.original_url.trim().to_string();
    if !is_trackable(&original) {
        return Err(ApiError::BadRequest(
            "originalUrl must be an http(s) URL".into(),
        ));
    }

    let email = state
        .db
        .get_owned_email(&user_id, &body.email_id)?
        .ok_or_else(|| ApiError::NotFound("Email not found".into()))?;
    let recipient = email
        .recipients
        .first()
        .ok_or_else(|| ApiError::BadRequest("email has no recipients".into()))?;

    let rewritten_url = click_url(&state.public_base_url, &email.id, &recipient.token, &original);
    debug!("rewrote link for {}: {}", email.id, original);
    Ok(Json(RewriteResponse {
        ok: true,
        original,
        rewritten_url,
    }))
}

/// GET /api/stats/summary
pub(super) async fn summary_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<SummaryView>, ApiError> {
    Ok(Json(stats::summary(&state.db, &user_id)?))
}

/// GET /api/stats/emails
pub(super) async fn emails_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<EmailsView>, ApiError> {
    Ok(Json(stats::emails(&state.db, &user_id)?))
}

/// GET /api/stats/email/{email_id}/recipients
pub(super) async fn recipients_handler(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(email_id): Path<String>,
) -> Result<Json<RecipientsView>, ApiError> {
    stats::recipients(&state.db, &user_id, &email_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Email not found".into()))
}
