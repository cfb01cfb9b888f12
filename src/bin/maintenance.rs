use std::env;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use aurora_verification::{config::AppConfig, db, state::AppState};

const USAGE: &str = "Usage: maintenance reset-verification <user-id> | purge-stale-registrations <days>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (Some("reset-verification"), Some(user)) => {
            let user_id: Uuid = user.parse().context("user id must be a UUID")?;
            reset_verification(user_id).await?
        }
        (Some("purge-stale-registrations"), Some(days)) => {
            let days: i64 = days.parse().context("days must be a whole number")?;
            purge_stale_registrations(days).await?
        }
        (Some(cmd), _) => {
            eprintln!("Unknown or incomplete command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        (None, _) => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn load_state() -> Result<AppState> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );
    let pool = db::init_pool(&config.database_url)?;
    AppState::bootstrap(config, pool).await
}

async fn reset_verification(user_id: Uuid) -> Result<()> {
    let state = load_state().await?;
    let removed = state.gateway().reset_verification(user_id).await?;
    println!("Removed {removed} verification record(s) for {user_id}; profile flag cleared.");
    Ok(())
}

async fn purge_stale_registrations(days: i64) -> Result<()> {
    if days < 1 {
        bail!("days must be at least 1");
    }
    let state = load_state().await?;
    let cutoff = Utc::now() - Duration::days(days);
    let removed = state.gateway().purge_stale_registrations(cutoff).await?;
    println!("Purged {removed} unclaimed registration verification(s) older than {days} day(s).");
    Ok(())
}
