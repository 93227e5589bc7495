//! Pipeline server binary.
//!
//! Builds the service objects once, arms the scheduler unless configured
//! idle, and serves the HTTP control surface.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use tracing::info;

use occupancy_pipeline::config::AppConfig;
use occupancy_pipeline::credentials::{CredentialCache, PgFarmAuth, SensourceAuth};
use occupancy_pipeline::logging;
use occupancy_pipeline::source::{SensourceClient, SourceClient};
use occupancy_pipeline::store::{PgStore, TargetStore};
use occupancy_pipeline::sync::SyncEngine;
use occupancy_pipeline::task::TaskOrchestrator;
use occupancy_pipeline::web::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    logging::init(&config.logger);

    let api_token = Arc::new(CredentialCache::new(
        Arc::new(SensourceAuth::new(&config.sensource)),
        Duration::seconds(30),
    ));
    // The database password guards long-lived pooled connections, so it is
    // refreshed well before its actual expiry.
    let pg_password = CredentialCache::new(Arc::new(PgFarmAuth::new(&config.pg)), Duration::hours(1));

    let store = Arc::new(
        PgStore::connect(&config.pg, &pg_password)
            .await
            .context("connecting to target database")?,
    );
    let source: Arc<dyn SourceClient> = Arc::new(SensourceClient::new(&config.sensource, api_token));
    let target: Arc<dyn TargetStore> = store.clone();
    let engine = Arc::new(SyncEngine::new(source, target));
    let orchestrator = TaskOrchestrator::new(engine, &config.task, &config.cron)?;

    if !config.cron.idle_at_startup {
        orchestrator.start();
    }

    let app = web::router(AppState {
        orchestrator,
        store,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("binding port {}", config.server.port))?;
    info!(port = config.server.port, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
