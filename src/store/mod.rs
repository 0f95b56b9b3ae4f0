//! SQLite-backed message store and append-only event log.
//!
//! Open and click events are only ever inserted. Aggregates are computed per
//! query with `GROUP BY`, never cached.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::errors::MailTraceError;

/// Fixed-width RFC 3339 so `MAX()` over the text column is chronological.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Where a hit came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    pub email_id: String,
    pub recipient_token: String,
    pub at: DateTime<Utc>,
    pub origin: OriginMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub email_id: String,
    pub recipient_token: String,
    pub url: String,
    pub at: DateTime<Utc>,
    pub origin: OriginMeta,
}

/// Append-only sink for tracking hits.
pub trait EventLog: Send + Sync {
    fn append_open(&self, event: &OpenEvent) -> Result<()>;
    fn append_click(&self, event: &ClickEvent) -> Result<()>;
}

/// Input for [`TrackingDb::create_email`].
#[derive(Debug, Clone, Default)]
pub struct NewEmail {
    pub user_id: String,
    pub subject: String,
    pub body_html: String,
    pub links: Vec<String>,
    /// Addresses in send order; blanks and duplicates are dropped.
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRecord {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub body_html: String,
    pub links: Vec<String>,
    pub created_at: String,
    pub recipients: Vec<RecipientRecord>,
}

/// Count and most recent timestamp for one event kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTally {
    pub count: u64,
    pub last: Option<String>,
}

/// Opens and clicks for one group key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub opens: EventTally,
    pub clicks: EventTally,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAggregate {
    pub email_id: String,
    pub subject: String,
    pub created_at: String,
    pub events: EventSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientAggregate {
    pub email: String,
    pub token: String,
    pub events: EventSummary,
}

fn tally(count: i64, last: Option<String>) -> EventTally {
    EventTally {
        count: u64::try_from(count).unwrap_or(0),
        last,
    }
}

pub struct TrackingDb {
    conn: Mutex<Connection>,
}

impl TrackingDb {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema().with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })?;
        Ok(db)
    }

    /// [`TrackingDb::new`] at the crate boundary: failures become
    /// [`MailTraceError::Storage`] carrying the full context chain.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, MailTraceError> {
        Self::new(db_path).map_err(|e| MailTraceError::Storage(format!("{:#}", e)))
    }

    /// Throwaway database, used by tests and the fuzz harness.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                body_html TEXT NOT NULL,
                links_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_emails_user ON emails(user_id, created_at);

            CREATE TABLE IF NOT EXISTS recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id TEXT NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
                email TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                position INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_recipients_email ON recipients(email_id, position);

            CREATE TABLE IF NOT EXISTS open_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id TEXT NOT NULL,
                recipient_token TEXT NOT NULL,
                ip TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_open_events_key ON open_events(email_id, recipient_token);

            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id TEXT NOT NULL,
                recipient_token TEXT NOT NULL,
                url TEXT NOT NULL,
                ip TEXT,
                user_agent TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_click_events_key ON click_events(email_id, recipient_token);",
        )?;
        Ok(())
    }

    /// Insert a message and mint one fresh token per recipient.
    pub fn create_email(&self, new: &NewEmail) -> Result<EmailRecord> {
        let mut recipients: Vec<RecipientRecord> = Vec::new();
        for addr in &new.recipients {
            let addr = addr.trim();
            if addr.is_empty() || recipients.iter().any(|r| r.email == addr) {
                continue;
            }
            recipients.push(RecipientRecord {
                email: addr.to_string(),
                token: new_id(),
            });
        }

        let record = EmailRecord {
            id: new_id(),
            user_id: new.user_id.clone(),
            subject: new.subject.clone(),
            body_html: new.body_html.clone(),
            links: new.links.clone(),
            created_at: format_timestamp(Utc::now()),
            recipients,
        };
        let links_json = serde_json::to_string(&record.links)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO emails (id, user_id, subject, body_html, links_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.user_id,
                record.subject,
                record.body_html,
                links_json,
                record.created_at
            ],
        )?;
        for (position, recipient) in record.recipients.iter().enumerate() {
            tx.execute(
                "INSERT INTO recipients (email_id, email, token, position) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, recipient.email, recipient.token, position as i64],
            )?;
        }
        tx.commit()?;

        debug!(
            "created email {} for user {} with {} recipients",
            record.id,
            record.user_id,
            record.recipients.len()
        );
        Ok(record)
    }

    pub fn get_email(&self, email_id: &str) -> Result<Option<EmailRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, subject, body_html, links_json, created_at
                 FROM emails WHERE id = ?1",
                [email_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, user_id, subject, body_html, links_json, created_at)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT email, token FROM recipients WHERE email_id = ?1 ORDER BY position",
        )?;
        let recipients: Result<Vec<_>, _> = stmt
            .query_map([&id], |row| {
                Ok(RecipientRecord {
                    email: row.get(0)?,
                    token: row.get(1)?,
                })
            })?
            .collect();

        Ok(Some(EmailRecord {
            links: serde_json::from_str(&links_json).unwrap_or_default(),
            id,
            user_id,
            subject,
            body_html,
            created_at,
            recipients: recipients?,
        }))
    }

    /// The email, only if it belongs to `user_id`.
    pub fn get_owned_email(&self, user_id: &str, email_id: &str) -> Result<Option<EmailRecord>> {
        Ok(self
            .get_email(email_id)?
            .filter(|email| email.user_id == user_id))
    }

    /// Opens and clicks grouped by message id, straight from the log.
    pub fn summary_for_email(&self, email_id: &str) -> Result<EventSummary> {
        let conn = self.lock()?;
        let (open_count, last_open): (i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MAX(created_at) FROM open_events WHERE email_id = ?1",
            [email_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (click_count, last_click): (i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MAX(created_at) FROM click_events WHERE email_id = ?1",
            [email_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(EventSummary {
            opens: tally(open_count, last_open),
            clicks: tally(click_count, last_click),
        })
    }

    /// Per-message aggregates for every message owned by `user_id`, newest
    /// first.
    pub fn email_aggregates(&self, user_id: &str) -> Result<Vec<EmailAggregate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.subject, e.created_at,
                    COALESCE(o.n, 0), o.last, COALESCE(c.n, 0), c.last
             FROM emails e
             LEFT JOIN (SELECT email_id, COUNT(*) AS n, MAX(created_at) AS last
                        FROM open_events GROUP BY email_id) o ON o.email_id = e.id
             LEFT JOIN (SELECT email_id, COUNT(*) AS n, MAX(created_at) AS last
                        FROM click_events GROUP BY email_id) c ON c.email_id = e.id
             WHERE e.user_id = ?1
             ORDER BY e.created_at DESC, e.id",
        )?;
        let rows: Result<Vec<_>, _> = stmt
            .query_map([user_id], |row| {
                Ok(EmailAggregate {
                    email_id: row.get(0)?,
                    subject: row.get(1)?,
                    created_at: row.get(2)?,
                    events: EventSummary {
                        opens: tally(row.get(3)?, row.get(4)?),
                        clicks: tally(row.get(5)?, row.get(6)?),
                    },
                })
            })?
            .collect();
        rows.map_err(|e| anyhow::anyhow!("failed to aggregate emails: {}", e))
    }

    /// Per-recipient aggregates for one message, in recipient order.
    /// Recipients with no events are included with zero counts.
    pub fn recipient_aggregates(&self, email_id: &str) -> Result<Vec<RecipientAggregate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.email, r.token,
                    COALESCE(o.n, 0), o.last, COALESCE(c.n, 0), c.last
             FROM recipients r
             LEFT JOIN (SELECT recipient_token, COUNT(*) AS n, MAX(created_at) AS last
                        FROM open_events WHERE email_id = ?1
                        GROUP BY recipient_token) o ON o.recipient_token = r.token
             LEFT JOIN (SELECT recipient_token, COUNT(*) AS n, MAX(created_at) AS last
                        FROM click_events WHERE email_id = ?1
                        GROUP BY recipient_token) c ON c.recipient_token = r.token
             WHERE r.email_id = ?1
             ORDER BY r.position",
        )?;
        let rows: Result<Vec<_>, _> = stmt
            .query_map([email_id], |row| {
                Ok(RecipientAggregate {
                    email: row.get(0)?,
                    token: row.get(1)?,
                    events: EventSummary {
                        opens: tally(row.get(2)?, row.get(3)?),
                        clicks: tally(row.get(4)?, row.get(5)?),
                    },
                })
            })?
            .collect();
        rows.map_err(|e| anyhow::anyhow!("failed to aggregate recipients: {}", e))
    }

    /// Total opens and clicks across every message owned by `user_id`.
    pub fn user_totals(&self, user_id: &str) -> Result<(u64, u64)> {
        let conn = self.lock()?;
        let (opens, clicks): (i64, i64) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM open_events
                 WHERE email_id IN (SELECT id FROM emails WHERE user_id = ?1)),
                (SELECT COUNT(*) FROM click_events
                 WHERE email_id IN (SELECT id FROM emails WHERE user_id = ?1))",
            [user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((
            u64::try_from(opens).unwrap_or(0),
            u64::try_from(clicks).unwrap_or(0),
        ))
    }
}

impl EventLog for TrackingDb {
    fn append_open(&self, event: &OpenEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO open_events (email_id, recipient_token, ip, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.email_id,
                event.recipient_token,
                event.origin.ip,
                event.origin.user_agent,
                format_timestamp(event.at)
            ],
        )
        .context("failed to record open event")?;
        Ok(())
    }

    fn append_click(&self, event: &ClickEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO click_events (email_id, recipient_token, url, ip, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.email_id,
                event.recipient_token,
                event.url,
                event.origin.ip,
                event.origin.user_agent,
                format_timestamp(event.at)
            ],
        )
        .context("failed to record click event")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
