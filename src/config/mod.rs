//! # Configuration
//!
//! Typed configuration loaded from `APP_`-prefixed environment variables
//! layered over built-in defaults. Nested keys use a double underscore,
//! e.g. `APP_PG__HOST` or `APP_SENSOURCE__CLIENT_ID`.

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Root configuration for the pipeline process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cron: CronConfig,
    pub sensource: SensourceConfig,
    pub pg: PgConfig,
    pub task: TaskConfig,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

/// Cron scheduling settings.
///
/// The schedule uses the six-field form (seconds first), so the default
/// fires daily at 04:00:00 in the configured timezone.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub schedule: String,
    pub timezone: String,
    /// When true the scheduler is not armed at process start.
    pub idle_at_startup: bool,
}

/// Sensource API access settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensourceConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub api_url: String,
}

/// Target database settings, including the PGFarm service-account login
/// used to derive the rotating connection password.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub pgfarm_url: String,
    pub password_file: String,
    pub pool_size: u32,
    /// Directory holding maintenance SQL files for `execute-sql-file`.
    pub sql_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Upper bound on one reconciliation run, in seconds.
    pub timeout_secs: u64,
    /// Terminate the process when a run times out so the supervisor
    /// restarts it with fresh connections.
    pub exit_on_timeout: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            schedule: "0 0 4 * * *".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            idle_at_startup: false,
        }
    }
}

impl Default for SensourceConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://auth.sensourceinc.com/oauth/token".to_string(),
            api_url: "https://vea.sensourceinc.com/api".to_string(),
        }
    }
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "pgfarm.library.ucdavis.edu".to_string(),
            port: 5432,
            database: "library/occupancy".to_string(),
            user: "occupancy-db-service-account".to_string(),
            pgfarm_url: "https://pgfarm.library.ucdavis.edu".to_string(),
            password_file: "/secrets/pg-farm-service-account-creds.txt".to_string(),
            pool_size: 5,
            sql_dir: "/app/sql".to_string(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            exit_on_timeout: true,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let app: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    /// Reject configurations that cannot possibly authenticate upstream.
    pub fn validate(&self) -> Result<()> {
        if self.sensource.client_id.is_empty() {
            return Err(PipelineError::Configuration(
                "sensource.client_id is not set (APP_SENSOURCE__CLIENT_ID)".to_string(),
            ));
        }
        if self.sensource.client_secret.is_empty() {
            return Err(PipelineError::Configuration(
                "sensource.client_secret is not set (APP_SENSOURCE__CLIENT_SECRET)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_contract() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cron.schedule, "0 0 4 * * *");
        assert_eq!(config.cron.timezone, "America/Los_Angeles");
        assert!(!config.cron.idle_at_startup);
        assert_eq!(config.task.timeout_secs, 600);
        assert!(config.task.exit_on_timeout);
        assert_eq!(config.pg.port, 5432);
    }

    #[test]
    fn validate_requires_sensource_credentials() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.sensource.client_id = "client".to_string();
        config.sensource.client_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }
}
