//! PostgreSQL store.
//!
//! The connection password is a short-lived PGFarm credential. It is
//! resolved through the credential cache before the pool is built and
//! injected into the connect options, instead of handing the pool a
//! password callback. If the credential rotates mid-process the supervisor
//! restart policy (see the orchestrator's timeout handling) is the
//! recovery path.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::config::PgConfig;
use crate::credentials::CredentialCache;
use crate::error::{PipelineError, Result};
use crate::models::{Location, NewOccupancyRecord, OccupancyRecord, SourceLocation, Window};
use crate::store::TargetStore;

pub struct PgStore {
    pool: PgPool,
    sql_dir: PathBuf,
}

impl PgStore {
    /// Resolve the service-account password and build the pool.
    pub async fn connect(config: &PgConfig, password: &CredentialCache) -> Result<Self> {
        let password = password.get().await?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&password);

        info!(
            host = %config.host,
            database = %config.database,
            user = %config.user,
            pool_size = config.pool_size,
            "connecting to target database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            sql_dir: PathBuf::from(&config.sql_dir),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute a maintenance SQL file from the configured directory.
    /// The name must be a bare file name; anything path-like is rejected.
    pub async fn execute_sql_file(&self, name: &str) -> Result<()> {
        let candidate = Path::new(name);
        let is_bare_file = candidate.components().count() == 1
            && matches!(candidate.components().next(), Some(Component::Normal(_)));
        if !is_bare_file {
            return Err(PipelineError::Configuration(format!(
                "invalid SQL file name: {name}"
            )));
        }

        let path = self.sql_dir.join(candidate);
        let sql = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::Configuration(format!("SQL file not found: {} ({e})", path.display()))
        })?;

        info!(file = name, "executing SQL file");
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetStore for PgStore {
    async fn list_locations(&self) -> Result<Vec<Location>> {
        Ok(Location::list_all(&self.pool).await?)
    }

    async fn insert_location(&self, location: &SourceLocation) -> Result<()> {
        Ok(Location::insert(&self.pool, location).await?)
    }

    async fn update_location(&self, location: &SourceLocation) -> Result<()> {
        Ok(Location::update(&self.pool, location).await?)
    }

    async fn list_occupancy(&self, window: Window) -> Result<Vec<OccupancyRecord>> {
        Ok(OccupancyRecord::list_window(&self.pool, window).await?)
    }

    async fn insert_occupancy(&self, record: &NewOccupancyRecord) -> Result<()> {
        Ok(OccupancyRecord::insert(&self.pool, record).await?)
    }

    async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(OccupancyRecord::watermark(&self.pool).await?)
    }
}
