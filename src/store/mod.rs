//! # Target Side
//!
//! The port the reconciliation engine writes to, and its PostgreSQL
//! implementation.

pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Location, NewOccupancyRecord, OccupancyRecord, SourceLocation, Window};

pub use pg::PgStore;

/// Read/write access to the relational store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn list_locations(&self) -> Result<Vec<Location>>;

    async fn insert_location(&self, location: &SourceLocation) -> Result<()>;

    async fn update_location(&self, location: &SourceLocation) -> Result<()>;

    async fn list_occupancy(&self, window: Window) -> Result<Vec<OccupancyRecord>>;

    async fn insert_occupancy(&self, record: &NewOccupancyRecord) -> Result<()>;

    /// `max(created_at)` over occupancy rows, if any exist.
    async fn watermark(&self) -> Result<Option<DateTime<Utc>>>;
}
