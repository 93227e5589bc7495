use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::models::Window;

/// One hourly aggregate as stored in `occupancy.occupancy`.
///
/// Rows are immutable once inserted; `(location_id, hour)` is the natural
/// key and must stay unique for all time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OccupancyRecord {
    pub location_id: i64,
    pub hour: DateTime<Utc>,
    pub traffic_in: i32,
    pub traffic_out: i32,
    pub occupancy_min: i32,
    pub occupancy_max: i32,
    pub occupancy_avg: i32,
    pub created_at: DateTime<Utc>,
}

/// A normalized hourly aggregate ready for insertion (no local timestamp
/// yet; the database stamps `created_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOccupancyRecord {
    pub location_id: i64,
    pub hour: DateTime<Utc>,
    pub traffic_in: i32,
    pub traffic_out: i32,
    pub occupancy_min: i32,
    pub occupancy_max: i32,
    pub occupancy_avg: i32,
}

impl NewOccupancyRecord {
    pub fn key(&self) -> (i64, DateTime<Utc>) {
        (self.location_id, self.hour)
    }
}

impl OccupancyRecord {
    pub fn key(&self) -> (i64, DateTime<Utc>) {
        (self.location_id, self.hour)
    }

    pub async fn list_window(
        pool: &PgPool,
        window: Window,
    ) -> Result<Vec<OccupancyRecord>, sqlx::Error> {
        sqlx::query_as::<_, OccupancyRecord>(
            "SELECT location_id, hour, traffic_in, traffic_out, occupancy_min, occupancy_max, \
             occupancy_avg, created_at \
             FROM occupancy.occupancy \
             WHERE hour >= $1 AND hour <= $2 \
             ORDER BY hour, location_id",
        )
        .bind(window.start)
        .bind(window.end)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(pool: &PgPool, record: &NewOccupancyRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO occupancy.occupancy \
             (location_id, hour, traffic_in, traffic_out, occupancy_min, occupancy_max, \
              occupancy_avg, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())",
        )
        .bind(record.location_id)
        .bind(record.hour)
        .bind(record.traffic_in)
        .bind(record.traffic_out)
        .bind(record.occupancy_min)
        .bind(record.occupancy_max)
        .bind(record.occupancy_avg)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Latest local insertion time across all occupancy rows, used to bound
    /// the next incremental fetch.
    pub async fn watermark(pool: &PgPool) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(created_at) FROM occupancy.occupancy",
        )
        .fetch_one(pool)
        .await
    }
}
