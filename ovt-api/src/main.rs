use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ovt_api::{config::read_config, engine::Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = read_config().context("failed to read configuration")?;

    let pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_lazy_with(config.database.with_db());
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let engine = Engine::new(pool, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = engine.scheduler.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    shutdown_tx.send(true).ok();
    scheduler_task.await.context("scheduler task panicked")?;

    Ok(())
}
