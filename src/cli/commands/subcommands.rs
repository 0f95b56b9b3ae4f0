use super::{StatsCommands, open_db};
use anyhow::Result;
use std::time::Duration;

use crate::auth::JwtKeys;
use crate::config::load_config;
use crate::stats::{EmailsView, RecipientsView, SummaryView};

pub(super) fn token_command(user: &str, ttl: Option<u64>) -> Result<()> {
    let user = user.trim();
    if user.is_empty() {
        anyhow::bail!("--user cannot be empty");
    }
    let config = load_config(None)?;
    let keys = JwtKeys::new(&config.server.jwt_secret)?;
    let token = keys.issue(user, ttl.map(Duration::from_secs))?;
    println!("{}", token);
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

pub(super) fn summary_lines(view: &SummaryView) -> Vec<String> {
    vec![
        format!("Opens:  {}", view.total_opens),
        format!("Clicks: {}", view.total_clicks),
    ]
}

pub(super) fn email_lines(view: &EmailsView) -> Vec<String> {
    if view.emails.is_empty() {
        return vec!["No tracked messages.".to_string()];
    }
    let mut lines = vec![
        format!(
            "{:<32} {:<30} {:>6} {:>6}  {:<27}",
            "Email", "Subject", "Opens", "Clicks", "Last open"
        ),
        "\u{2500}".repeat(106),
    ];
    for row in &view.emails {
        let subject: String = row.subject.chars().take(30).collect();
        lines.push(format!(
            "{:<32} {:<30} {:>6} {:>6}  {:<27}",
            row.email_id,
            subject,
            row.total_opens,
            row.total_clicks,
            or_dash(row.last_open.as_deref())
        ));
    }
    lines
}

pub(super) fn recipient_lines(view: &RecipientsView) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{:<36} {:>6} {:>6}  {:<27}",
            "Recipient", "Opens", "Clicks", "Last click"
        ),
        "\u{2500}".repeat(80),
    ];
    for row in &view.recipients {
        lines.push(format!(
            "{:<36} {:>6} {:>6}  {:<27}",
            row.email,
            row.total_opens,
            row.total_clicks,
            or_dash(row.last_click.as_deref())
        ));
    }
    lines
}

pub(super) fn stats_command(cmd: &StatsCommands) -> Result<()> {
    let config = load_config(None)?;
    let db_path = config.database_path();
    if !db_path.exists() {
        anyhow::bail!(
            "tracking database not found at {}. Run `mailtrace init` first.",
            db_path.display()
        );
    }
    let db = open_db(&config)?;

    let lines = match cmd {
        StatsCommands::Summary { user } => summary_lines(&crate::stats::summary(&db, user)?),
        StatsCommands::Emails { user } => email_lines(&crate::stats::emails(&db, user)?),
        StatsCommands::Recipients { user, email_id } => {
            let Some(view) = crate::stats::recipients(&db, user, email_id)? else {
                anyhow::bail!("no message {} for user {}", email_id, user);
            };
            recipient_lines(&view)
        }
    };
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

pub(super) fn status_command() -> Result<()> {
    use crate::config::credentials::{CREDENTIAL_NAMES, credential_source};

    let config = load_config(None)?;
    let config_path = crate::config::get_config_path()?;
    let db_path = config.database_path();

    println!("mailtrace status\n");
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() {
            "\u{2713}"
        } else {
            "\u{2717}"
        }
    );
    println!(
        "Database: {} {}",
        db_path.display(),
        if db_path.exists() {
            "\u{2713}"
        } else {
            "\u{2717}"
        }
    );
    println!(
        "Server: {}:{} (public {})",
        config.server.host, config.server.port, config.server.public_base_url
    );
    println!(
        "Client: api {} timeout {}ms debounce {}ms tracking {}",
        config.client.api_base_url,
        config.client.relay_timeout_ms,
        config.client.debounce_ms,
        if config.client.tracking_enabled {
            "on"
        } else {
            "off"
        }
    );

    println!("\nCredentials:");
    for name in CREDENTIAL_NAMES {
        println!("  {:<12} {}", name, credential_source(&config, name));
    }
    Ok(())
}
