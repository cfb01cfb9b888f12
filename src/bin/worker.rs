use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use aurora_verification::{config::AppConfig, db, default_handlers, state::AppState, Worker};

const WORKER_POOL_SIZE: u32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = WORKER_POOL_SIZE,
        poll_interval_ms = config.worker_poll_interval_ms,
        batch_size = config.document_batch_size,
        batch_delay_ms = config.document_batch_delay_ms,
        smtp_enabled = config.smtp.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, WORKER_POOL_SIZE)?;
    db::run_migrations(&pool).await?;
    let state = Arc::new(AppState::bootstrap(config, pool).await?);
    let worker = Worker::new(state, default_handlers(), poll_interval);

    // Jobs interrupted here stay `processing`; the queue does not reclaim them.
    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
