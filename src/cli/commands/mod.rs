mod subcommands;

#[cfg(test)]
mod tests;

use crate::auth::JwtKeys;
use crate::config::{Config, load_config};
use crate::gateway::AppState;
use crate::store::TrackingDb;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mailtrace")]
#[command(about = "Open and click tracking for webmail")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration with a fresh signing secret
    Init,
    /// Run the tracking backend
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },
    /// Mint a bearer credential for a user
    Token {
        #[arg(long, short = 'u')]
        user: String,
        /// Lifetime in seconds (no expiry if omitted)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Show open and click statistics
    Stats {
        #[command(subcommand)]
        cmd: StatsCommands,
    },
    /// Show configuration and credential sources
    Status,
}

#[derive(Subcommand)]
enum StatsCommands {
    /// Total opens and clicks across a user's messages
    Summary {
        #[arg(long, short = 'u')]
        user: String,
    },
    /// Per-message totals, newest first
    Emails {
        #[arg(long, short = 'u')]
        user: String,
    },
    /// Per-recipient totals for one message
    Recipients {
        #[arg(long, short = 'u')]
        user: String,
        /// Message id
        email_id: String,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init()?;
        }
        Commands::Serve { host, port } => {
            serve(host, port).await?;
        }
        Commands::Token { user, ttl } => {
            subcommands::token_command(&user, ttl)?;
        }
        Commands::Stats { ref cmd } => {
            subcommands::stats_command(cmd)?;
        }
        Commands::Status => {
            subcommands::status_command()?;
        }
    }

    Ok(())
}

/// 256 bits of randomness, hex encoded.
fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn init() -> Result<()> {
    println!("Initializing mailtrace...");

    let config_path = crate::config::get_config_path()?;
    if config_path.exists() {
        println!(
            "\u{26a0}\u{fe0f}  Config already exists at {}",
            config_path.display()
        );
        println!("Overwrite? (y/N): ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }

    let mut config = Config::default();
    config.server.jwt_secret = generate_secret();
    crate::config::save_config(&config, Some(config_path.as_path()))?;
    println!("\u{2713} Created config at {}", config_path.display());

    let db_path = config.database_path();
    TrackingDb::new(&db_path)?;
    println!("\u{2713} Created database at {}", db_path.display());

    println!("\nNext steps:");
    println!("  1. Start the backend: mailtrace serve");
    println!("  2. Mint a credential: mailtrace token --user <id>");

    Ok(())
}

fn open_db(config: &Config) -> Result<TrackingDb> {
    let db_path = config.database_path();
    debug!("database: {}", db_path.display());
    Ok(TrackingDb::open(&db_path)?)
}

async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    info!("Loading configuration...");
    let mut config = load_config(None)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let jwt = JwtKeys::new(&config.server.jwt_secret)
        .context("server.jwtSecret must be set (run `mailtrace init` or set MAILTRACE_JWT_SECRET)")?;
    let db = Arc::new(open_db(&config)?);
    let state = AppState::new(db, jwt, &config.server.public_base_url);

    let (mut server, addr) =
        crate::gateway::start(&config.server.host, config.server.port, state).await?;
    println!("mailtrace backend listening on http://{}", addr);
    println!("Public base URL: {}", config.server.public_base_url);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
            server.abort();
        }
        _ = &mut server => {}
    }

    Ok(())
}
