//! Aggregation views served by the stats endpoints and the `stats` command.

use anyhow::Result;
use serde::Serialize;

use crate::store::{EmailAggregate, RecipientAggregate, TrackingDb};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub ok: bool,
    pub total_opens: u64,
    pub total_clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    pub email_id: String,
    pub subject: String,
    pub created_at: String,
    pub total_opens: u64,
    pub total_clicks: u64,
    pub last_open: Option<String>,
    pub last_click: Option<String>,
}

impl From<EmailAggregate> for EmailStats {
    fn from(agg: EmailAggregate) -> Self {
        Self {
            email_id: agg.email_id,
            subject: agg.subject,
            created_at: agg.created_at,
            total_opens: agg.events.opens.count,
            total_clicks: agg.events.clicks.count,
            last_open: agg.events.opens.last,
            last_click: agg.events.clicks.last,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientStats {
    pub email: String,
    pub token: String,
    pub total_opens: u64,
    pub total_clicks: u64,
    pub last_open: Option<String>,
    pub last_click: Option<String>,
}

impl From<RecipientAggregate> for RecipientStats {
    fn from(agg: RecipientAggregate) -> Self {
        Self {
            email: agg.email,
            token: agg.token,
            total_opens: agg.events.opens.count,
            total_clicks: agg.events.clicks.count,
            last_open: agg.events.opens.last,
            last_click: agg.events.clicks.last,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailsView {
    pub ok: bool,
    pub emails: Vec<EmailStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientsView {
    pub ok: bool,
    pub recipients: Vec<RecipientStats>,
}

pub fn summary(db: &TrackingDb, user_id: &str) -> Result<SummaryView> {
    let (total_opens, total_clicks) = db.user_totals(user_id)?;
    Ok(SummaryView {
        ok: true,
        total_opens,
        total_clicks,
    })
}

pub fn emails(db: &TrackingDb, user_id: &str) -> Result<EmailsView> {
    let emails = db
        .email_aggregates(user_id)?
        .into_iter()
        .map(EmailStats::from)
        .collect();
    Ok(EmailsView { ok: true, emails })
}

/// Per-recipient stats for one message; `None` when the message does not
/// exist or belongs to someone else.
pub fn recipients(db: &TrackingDb, user_id: &str, email_id: &str) -> Result<Option<RecipientsView>> {
    if db.get_owned_email(user_id, email_id)?.is_none() {
        return Ok(None);
    }
    let recipients = db
        .recipient_aggregates(email_id)?
        .into_iter()
        .map(RecipientStats::from)
        .collect();
    Ok(Some(RecipientsView {
        ok: true,
        recipients,
    }))
}
