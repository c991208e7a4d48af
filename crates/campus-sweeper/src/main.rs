use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use campus_db::Database;
use campus_sweeper::{DEFAULT_INTERVAL_SECS, Sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("CAMPUS_DB_PATH").unwrap_or_else(|_| "campus.db".into());
    let interval_secs: u64 = match std::env::var("CAMPUS_SWEEP_INTERVAL_SECS") {
        Ok(v) => v.parse()?,
        Err(_) => DEFAULT_INTERVAL_SECS,
    };

    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let sweeper = Sweeper::new(db, Duration::from_secs(interval_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(sweeper.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    task.await?;

    Ok(())
}
