use std::sync::Arc;

use backend::{
    build_rocket,
    config::Config,
    monitor::run_window_monitor,
    pg_store::PgStore,
    processor::VoteProcessor,
    routes::AppState,
    store::{DocumentStore, MemoryStore},
};
use shared::window::SystemClock;
use shared::ErrorCode;
use shuttle_runtime::CustomError;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn open_store(pool: PgPool) -> Arc<dyn DocumentStore> {
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        error!(code = %ErrorCode::InitializationFailure, "Migrations failed, using in-memory store: {}", e);
        return Arc::new(MemoryStore::new());
    }
    info!("📋 Migrations complete");

    match PgStore::connect(pool).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(code = %ErrorCode::InitializationFailure, "Postgres store unavailable, using in-memory store: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

#[shuttle_runtime::main]
async fn rocket(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secret_store: shuttle_runtime::SecretStore,
) -> shuttle_rocket::ShuttleRocket {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    info!("🚀 Starting Mummy Mayhem Vote server");

    let config = Config::from_lookup(|key| secret_store.get(key).or_else(|| std::env::var(key).ok()))
        .map_err(CustomError::new)?;

    let store = open_store(pool).await;
    let processor = VoteProcessor::new(
        store,
        Arc::new(SystemClock),
        config.retry.clone(),
        config.voting_duration_minutes,
    );

    tokio::spawn(run_window_monitor(processor.clone()));

    let rocket = build_rocket(AppState::new(processor, &config));
    Ok(rocket.into())
}
