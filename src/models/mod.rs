//! # Data Layer
//!
//! Row types for the two synchronized entities. Target-side rows own their
//! SQL as methods taking a `&PgPool`; source-shaped records carry the
//! upstream field names through serde renames.

pub mod location;
pub mod occupancy;

use chrono::{DateTime, Utc};

pub use location::{Location, SourceLocation};
pub use occupancy::{NewOccupancyRecord, OccupancyRecord};

/// An inclusive time window over hourly data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
