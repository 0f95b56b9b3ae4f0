use super::subcommands::{email_lines, recipient_lines, summary_lines};
use super::*;
use crate::stats::{EmailStats, EmailsView, RecipientStats, RecipientsView, SummaryView};

#[test]
fn test_generate_secret_is_long_and_fresh() {
    let a = generate_secret();
    let b = generate_secret();
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}

#[test]
fn test_cli_parses_token_command() {
    let cli = Cli::try_parse_from(["mailtrace", "token", "--user", "u1", "--ttl", "3600"]).unwrap();
    match cli.command {
        Commands::Token { user, ttl } => {
            assert_eq!(user, "u1");
            assert_eq!(ttl, Some(3600));
        }
        _ => panic!("expected token command"),
    }
}

#[test]
fn test_cli_parses_stats_recipients() {
    let cli =
        Cli::try_parse_from(["mailtrace", "stats", "recipients", "-u", "u1", "abc123"]).unwrap();
    match cli.command {
        Commands::Stats {
            cmd: StatsCommands::Recipients { user, email_id },
        } => {
            assert_eq!(user, "u1");
            assert_eq!(email_id, "abc123");
        }
        _ => panic!("expected stats recipients"),
    }
}

#[test]
fn test_cli_requires_user_for_stats() {
    assert!(Cli::try_parse_from(["mailtrace", "stats", "summary"]).is_err());
}

#[test]
fn test_serve_overrides_parse() {
    let cli = Cli::try_parse_from(["mailtrace", "serve", "--port", "8080"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Serve {
            host: None,
            port: Some(8080)
        }
    ));
}

#[test]
fn test_summary_lines() {
    let lines = summary_lines(&SummaryView {
        ok: true,
        total_opens: 3,
        total_clicks: 1,
    });
    assert_eq!(lines, vec!["Opens:  3", "Clicks: 1"]);
}

#[test]
fn test_email_lines_empty_and_filled() {
    let empty = email_lines(&EmailsView {
        ok: true,
        emails: vec![],
    });
    assert_eq!(empty, vec!["No tracked messages."]);

    let lines = email_lines(&EmailsView {
        ok: true,
        emails: vec![EmailStats {
            email_id: "e1".into(),
            subject: "x".repeat(50),
            created_at: "2026-01-01T00:00:00.000000Z".into(),
            total_opens: 2,
            total_clicks: 0,
            last_open: None,
            last_click: None,
        }],
    });
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with("e1 "));
    assert!(!lines[2].contains(&"x".repeat(31)));
    assert!(lines[2].trim_end().ends_with('-'));
}

#[test]
fn test_recipient_lines_show_last_click() {
    let lines = recipient_lines(&RecipientsView {
        ok: true,
        recipients: vec![RecipientStats {
            email: "a@x.com".into(),
            token: "t".into(),
            total_opens: 1,
            total_clicks: 1,
            last_open: Some("2026-01-01T00:00:00.000000Z".into()),
            last_click: Some("2026-01-02T00:00:00.000000Z".into()),
        }],
    });
    assert!(lines[2].contains("a@x.com"));
    assert!(lines[2].contains("2026-01-02T00:00:00.000000Z"));
}
