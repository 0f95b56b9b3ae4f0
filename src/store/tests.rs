use super::*;
use chrono::TimeZone;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn open(email_id: &str, token: &str, secs: i64) -> OpenEvent {
    OpenEvent {
        email_id: email_id.into(),
        recipient_token: token.into(),
        at: at(secs),
        origin: OriginMeta::default(),
    }
}

fn click(email_id: &str, token: &str, secs: i64) -> ClickEvent {
    ClickEvent {
        email_id: email_id.into(),
        recipient_token: token.into(),
        url: "https://a.io".into(),
        at: at(secs),
        origin: OriginMeta {
            ip: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
        },
    }
}

fn new_email(user: &str, recipients: &[&str]) -> NewEmail {
    NewEmail {
        user_id: user.into(),
        subject: "Quarterly".into(),
        body_html: "<p>numbers</p>".into(),
        links: vec!["https://a.io".into()],
        recipients: recipients.iter().map(|r| (*r).to_string()).collect(),
    }
}

#[test]
fn test_db_new_creates_schema_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("mailtrace.sqlite3");
    let db = TrackingDb::new(&path).unwrap();
    assert!(path.exists());
    assert!(db.email_aggregates("nobody").unwrap().is_empty());

    // reopening an existing database is fine
    drop(db);
    TrackingDb::new(&path).unwrap();
}

#[test]
fn test_create_email_mints_distinct_tokens() {
    let db = TrackingDb::in_memory().unwrap();
    let email = db
        .create_email(&new_email("u1", &["a@x.com", " b@x.com ", "a@x.com", ""]))
        .unwrap();

    assert_eq!(email.recipients.len(), 2);
    assert_eq!(email.recipients[0].email, "a@x.com");
    assert_eq!(email.recipients[1].email, "b@x.com");
    assert!(!email.recipients[0].token.is_empty());
    assert_ne!(email.recipients[0].token, email.recipients[1].token);
    assert_ne!(email.id, email.recipients[0].token);

    let loaded = db.get_email(&email.id).unwrap().unwrap();
    assert_eq!(loaded, email);
}

#[test]
fn test_owned_email_filters_other_users() {
    let db = TrackingDb::in_memory().unwrap();
    let email = db.create_email(&new_email("u1", &["a@x.com"])).unwrap();
    assert!(db.get_owned_email("u1", &email.id).unwrap().is_some());
    assert!(db.get_owned_email("u2", &email.id).unwrap().is_none());
    assert!(db.get_email("missing").unwrap().is_none());
}

#[test]
fn test_aggregation_per_message_and_recipient() {
    let db = TrackingDb::in_memory().unwrap();
    let email = db
        .create_email(&new_email("u1", &["a@x.com", "b@x.com"]))
        .unwrap();
    let a = email.recipients[0].token.clone();
    let b = email.recipients[1].token.clone();

    db.append_open(&open(&email.id, &a, 10)).unwrap();
    db.append_open(&open(&email.id, &b, 30)).unwrap();
    db.append_open(&open(&email.id, &a, 20)).unwrap();

    let summary = db.summary_for_email(&email.id).unwrap();
    assert_eq!(summary.opens.count, 3);
    assert_eq!(summary.opens.last, Some(format_timestamp(at(30))));
    assert_eq!(summary.clicks, EventTally::default());

    let per_recipient = db.recipient_aggregates(&email.id).unwrap();
    assert_eq!(per_recipient.len(), 2);
    let ra = per_recipient.iter().find(|r| r.token == a).unwrap();
    let rb = per_recipient.iter().find(|r| r.token == b).unwrap();
    assert_eq!(ra.events.opens.count, 2);
    assert_eq!(ra.events.opens.last, Some(format_timestamp(at(20))));
    assert_eq!(rb.events.opens.count, 1);
    assert_eq!(rb.events.opens.last, Some(format_timestamp(at(30))));

    let per_email = db.email_aggregates("u1").unwrap();
    assert_eq!(per_email.len(), 1);
    assert_eq!(per_email[0].events.opens.count, 3);
}

#[test]
fn test_repeated_hits_are_all_counted() {
    let db = TrackingDb::in_memory().unwrap();
    let email = db.create_email(&new_email("u1", &["a@x.com"])).unwrap();
    let token = &email.recipients[0].token;
    for _ in 0..4 {
        db.append_click(&click(&email.id, token, 5)).unwrap();
    }
    let rows = db.recipient_aggregates(&email.id).unwrap();
    assert_eq!(rows[0].events.clicks.count, 4);
    assert_eq!(rows[0].events.opens.count, 0);
    assert_eq!(db.user_totals("u1").unwrap(), (0, 4));
}

#[test]
fn test_events_for_unknown_ids_are_recorded_but_unattributed() {
    let db = TrackingDb::in_memory().unwrap();
    db.append_open(&open("ghost", "tok", 1)).unwrap();
    assert_eq!(db.summary_for_email("ghost").unwrap().opens.count, 1);
    assert_eq!(db.user_totals("u1").unwrap(), (0, 0));
}

#[test]
fn test_user_totals_scoped_to_owner() {
    let db = TrackingDb::in_memory().unwrap();
    let mine = db.create_email(&new_email("u1", &["a@x.com"])).unwrap();
    let theirs = db.create_email(&new_email("u2", &["a@x.com"])).unwrap();
    db.append_open(&open(&mine.id, &mine.recipients[0].token, 1))
        .unwrap();
    db.append_open(&open(&theirs.id, &theirs.recipients[0].token, 1))
        .unwrap();
    db.append_click(&click(&theirs.id, &theirs.recipients[0].token, 2))
        .unwrap();

    assert_eq!(db.user_totals("u1").unwrap(), (1, 0));
    assert_eq!(db.user_totals("u2").unwrap(), (1, 1));
    assert_eq!(db.email_aggregates("u1").unwrap().len(), 1);
}

#[test]
fn test_timestamp_format_sorts_chronologically() {
    let early = format_timestamp(at(9));
    let late = format_timestamp(at(10));
    assert!(early < late);
    assert!(early.ends_with('Z'));
    assert_eq!(early.len(), late.len());
}

#[test]
fn test_open_reports_storage_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().join("nested").join("mailtrace.sqlite3");
    let err = TrackingDb::open(&path).err().unwrap();
    assert!(matches!(err, MailTraceError::Storage(_)));
    assert!(err.to_string().starts_with("Storage error: Failed to create database parent directory"));
}
