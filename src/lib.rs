//! # Occupancy Pipeline
//!
//! Periodically reconciles occupancy sensor data from the Sensource
//! analytics API into PostgreSQL for durable reporting.
//!
//! ## Architecture
//!
//! The [`task::TaskOrchestrator`] owns lifecycle state (idle / scheduled /
//! running), the cron timer, and mutual exclusion between the scheduled
//! and manual trigger paths. Each trigger invokes the
//! [`sync::SyncEngine`], which upserts locations and then performs an
//! incremental, watermark-bounded insert of hourly occupancy rows.
//! Both upstreams authenticate through the single-flight
//! [`credentials::CredentialCache`]: the Sensource OAuth token on the
//! source side and the PGFarm service-account password on the target side.
//!
//! ## Module Organization
//!
//! - [`config`] - Environment-driven configuration
//! - [`credentials`] - Expiring-credential cache and the two auth flows
//! - [`models`] - Location and occupancy rows with their SQL
//! - [`source`] - Sensource API client
//! - [`store`] - PostgreSQL store
//! - [`sync`] - Reconciliation engine
//! - [`task`] - Task orchestration state machine
//! - [`web`] - Thin HTTP control surface
//!
//! ## Consistency model
//!
//! Occupancy rows are immutable once inserted and keyed by
//! `(location_id, hour)`; re-running a window never duplicates them.
//! Location writes and occupancy writes are not wrapped in a single
//! transaction, so a failed run can leave updated locations with stale
//! occupancy until the next trigger.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod models;
pub mod source;
pub mod store;
pub mod sync;
pub mod task;
pub mod web;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
