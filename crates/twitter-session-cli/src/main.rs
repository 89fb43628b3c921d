// ============================================================================
// twsession - terminal front end for the Twitter session core
// ============================================================================
// Usage:
//   twsession status                  Restore the stored session and show it
//   twsession login                   Authorize in the browser
//   twsession logout                  Drop the session and stored credential
//   twsession timeline [--count N]    Show the user's recent tweets
//   twsession whoami [--json]         Show the stored identity (offline)
// ============================================================================

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};
use twitter_session_core::{
    CredentialDb, CredentialStore, LoopbackNavigator, SessionConfig, SessionState, TwitterSession,
};

/// Twitter session management tool
#[derive(Parser)]
#[command(name = "twsession", version, about = "Log in to Twitter and manage the stored session")]
struct Cli {
    /// Path to the credential store (default: ~/.twsession/session.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the stored session (auto-login) and print its state
    Status,

    /// Run the browser authorization flow
    Login,

    /// Log out and erase the stored credential
    Logout,

    /// Print the logged-in user's most recent tweets
    Timeline {
        /// Number of tweets to fetch
        #[arg(long, default_value = "10")]
        count: u32,
    },

    /// Print the stored identity without contacting Twitter
    Whoami {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Twitter's `created_at`, e.g. "Wed Oct 10 20:19:24 +0000 2018"
fn format_created_at(raw: &str) -> String {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Connected { session } if session.is_cached() => format!(
            "Logged in as @{} (offline: identity could not be verified)",
            session.screen_name()
        ),
        SessionState::Connected { session } => format!("Logged in as @{}", session.screen_name()),
        SessionState::LoginFailed { error } => format!("Login failed: {}", error),
        SessionState::Disconnected => "Not logged in".to_string(),
        other => format!("Session is {}", other.kind()),
    }
}

fn open_session(config: &SessionConfig) -> Result<TwitterSession> {
    let observer = |state: &SessionState| info!("Session state: {}", state);
    TwitterSession::from_config(config, Arc::new(observer))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("twitter_session_core=info,twsession=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env();
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }
    debug!("Credential store: {:?}", config.db_path);

    match cli.command {
        Commands::Status => cmd_status(&config).await,
        Commands::Login => cmd_login(&config).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Timeline { count } => cmd_timeline(&config, count).await,
        Commands::Whoami { json } => cmd_whoami(&config, json),
    }
}

async fn cmd_status(config: &SessionConfig) -> Result<()> {
    let session = open_session(config)?;
    let state = session.wait_settled().await;
    session.flush_notifications().await;
    println!("{}", describe(&state));
    Ok(())
}

async fn cmd_login(config: &SessionConfig) -> Result<()> {
    let session = open_session(config)?;
    let state = session.wait_settled().await;
    if let SessionState::Connected { session: current } = &state {
        println!(
            "Already logged in as @{}. Run `twsession logout` first to switch accounts.",
            current.screen_name()
        );
        return Ok(());
    }

    let navigator = LoopbackNavigator::from_config(config, Handle::current())?;
    if !session.login(Arc::new(navigator)) {
        bail!("A login is already in progress");
    }
    println!("Complete the authorization in your browser (Ctrl-C to abort)...");

    let state = tokio::select! {
        state = session.wait_settled() => state,
        _ = tokio::signal::ctrl_c() => {
            session.cancel_login();
            session.current_state()
        }
    };
    session.flush_notifications().await;
    println!("{}", describe(&state));

    if let SessionState::LoginFailed { .. } = state {
        bail!("Authorization did not complete");
    }
    Ok(())
}

async fn cmd_logout(config: &SessionConfig) -> Result<()> {
    let session = open_session(config)?;
    if session.logout() {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    session.flush_notifications().await;
    Ok(())
}

async fn cmd_timeline(config: &SessionConfig, count: u32) -> Result<()> {
    let session = open_session(config)?;
    let state = session.wait_settled().await;

    let Some(tweets) = session.load_timeline(count).await? else {
        bail!("{}. Run `twsession login` first.", describe(&state));
    };

    if tweets.is_empty() {
        println!("No tweets found.");
        return Ok(());
    }

    println!("{:<20}  {:<20}  {}", "ID", "CREATED", "TEXT");
    println!("{}", "-".repeat(90));
    for tweet in &tweets {
        let text: String = tweet.text.replace('\n', " ").chars().take(60).collect();
        println!(
            "{:<20}  {:<20}  {}",
            tweet.id,
            format_created_at(&tweet.created_at),
            text
        );
    }
    Ok(())
}

fn cmd_whoami(config: &SessionConfig, json: bool) -> Result<()> {
    let store = CredentialDb::open(config.db_path.as_deref())?;
    let credential = store.load()?;

    if json {
        let value = match &credential {
            Some(c) => serde_json::json!({
                "logged_in": true,
                "user_id": c.user_id,
                "screen_name": c.screen_name,
            }),
            None => serde_json::json!({ "logged_in": false }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match credential {
        Some(c) => println!("@{} (user id {})", c.screen_name, c.user_id),
        None => println!("No stored credential."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_created_at() {
        assert_eq!(
            format_created_at("Wed Oct 10 20:19:24 +0000 2018"),
            "2018-10-10 20:19 UTC"
        );
        assert_eq!(format_created_at("yesterday"), "yesterday");
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&SessionState::Disconnected), "Not logged in");
        assert_eq!(describe(&SessionState::Connecting), "Session is connecting");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["twsession", "--db-path", "/tmp/x.redb", "timeline", "--count", "5"])
            .unwrap();
        assert_eq!(cli.db_path.as_deref(), Some("/tmp/x.redb"));
        assert!(matches!(cli.command, Commands::Timeline { count: 5 }));
    }
}
