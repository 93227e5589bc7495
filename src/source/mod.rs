//! # Source Side
//!
//! The port the reconciliation engine reads from, and its Sensource
//! implementation.

pub mod sensource;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewOccupancyRecord, SourceLocation, Window};

pub use sensource::SensourceClient;

/// Read access to the upstream analytics API.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn list_locations(&self) -> Result<Vec<SourceLocation>>;

    /// Hourly aggregates for the window, normalized to the target schema:
    /// field names mapped, hours truncated, averages coerced to integers.
    async fn list_occupancy(&self, window: Window) -> Result<Vec<NewOccupancyRecord>>;
}
