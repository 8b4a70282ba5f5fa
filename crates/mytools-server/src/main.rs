//! MyTools Server - Main entry point

use anyhow::Result;
use mytools_common::logging::{init_logging, LogConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tracing::info;

use mytools_server::{
    api::{self, AppState},
    audit::{AuditRecordStore, AuditRecorder, InMemoryAuditStore, PgAuditStore},
    config::{AuditStoreKind, Config},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("mytools-server")
        .filter_directives("mytools_server=debug,tower_http=info,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting MyTools Server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let (store, db): (Arc<dyn AuditRecordStore>, Option<PgPool>) = match config.audit.store {
        AuditStoreKind::Postgres => {
            let pool = connect_database(&config).await?;
            (Arc::new(PgAuditStore::new(pool.clone())), Some(pool))
        },
        AuditStoreKind::Memory => {
            info!("Audit records are kept in memory (AUDIT_STORE=memory)");
            (Arc::new(InMemoryAuditStore::new()), None)
        },
    };

    let recorder = Arc::new(AuditRecorder::new(store, config.audit.clone()));
    info!(store = recorder.store().backend(), "Audit recorder initialized");

    api::serve(config, AppState::new(recorder, db)).await
}

/// Open the pool and bring the schema up to date
async fn connect_database(config: &Config) -> Result<PgPool> {
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    Ok(db_pool)
}
