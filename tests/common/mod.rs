//! In-memory fakes of the source and store ports, shared by the
//! integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use occupancy_pipeline::error::Result;
use occupancy_pipeline::models::{
    Location, NewOccupancyRecord, OccupancyRecord, SourceLocation, Window,
};
use occupancy_pipeline::source::SourceClient;
use occupancy_pipeline::store::TargetStore;
use occupancy_pipeline::sync::SyncEngine;

/// Source fake backed by plain vectors. Occupancy rows are filtered by the
/// requested window the way the real API bounds its queries.
#[derive(Default)]
pub struct FakeSource {
    pub locations: Mutex<Vec<SourceLocation>>,
    pub occupancy: Mutex<Vec<NewOccupancyRecord>>,
    pub last_window: Mutex<Option<Window>>,
    /// Injected latency on the first fetch of a run.
    pub delay: Mutex<Option<Duration>>,
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn list_locations(&self) -> Result<Vec<SourceLocation>> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.locations.lock().clone())
    }

    async fn list_occupancy(&self, window: Window) -> Result<Vec<NewOccupancyRecord>> {
        *self.last_window.lock() = Some(window);
        Ok(self
            .occupancy
            .lock()
            .iter()
            .filter(|record| record.hour >= window.start && record.hour <= window.end)
            .cloned()
            .collect())
    }
}

/// Store fake that enforces the `(location_id, hour)` uniqueness the real
/// table guarantees with its primary key.
#[derive(Default)]
pub struct FakeStore {
    pub locations: Mutex<Vec<Location>>,
    pub occupancy: Mutex<Vec<OccupancyRecord>>,
    pub watermark: Mutex<Option<DateTime<Utc>>>,
    pub location_inserts: AtomicUsize,
    pub location_updates: AtomicUsize,
    pub occupancy_inserts: AtomicUsize,
}

fn materialize(source: &SourceLocation) -> Location {
    let now = Utc::now();
    Location {
        location_id: source.location_id,
        name: source.name.clone(),
        description: source.description.clone(),
        country: source.country.clone(),
        city: source.city.clone(),
        postal_code: source.postal_code.clone(),
        state: source.state.clone(),
        street: source.street.clone(),
        timezone: source.timezone.clone(),
        latitude: source.latitude,
        longitude: source.longitude,
        src_created_at: source.src_created_at,
        src_updated_at: source.src_updated_at,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl TargetStore for FakeStore {
    async fn list_locations(&self) -> Result<Vec<Location>> {
        Ok(self.locations.lock().clone())
    }

    async fn insert_location(&self, location: &SourceLocation) -> Result<()> {
        self.location_inserts.fetch_add(1, Ordering::SeqCst);
        self.locations.lock().push(materialize(location));
        Ok(())
    }

    async fn update_location(&self, location: &SourceLocation) -> Result<()> {
        self.location_updates.fetch_add(1, Ordering::SeqCst);
        let mut locations = self.locations.lock();
        if let Some(existing) = locations
            .iter_mut()
            .find(|l| l.location_id == location.location_id)
        {
            *existing = materialize(location);
        }
        Ok(())
    }

    async fn list_occupancy(&self, window: Window) -> Result<Vec<OccupancyRecord>> {
        Ok(self
            .occupancy
            .lock()
            .iter()
            .filter(|record| record.hour >= window.start && record.hour <= window.end)
            .cloned()
            .collect())
    }

    async fn insert_occupancy(&self, record: &NewOccupancyRecord) -> Result<()> {
        let mut occupancy = self.occupancy.lock();
        if occupancy
            .iter()
            .any(|existing| existing.key() == record.key())
        {
            return Err(sqlx::Error::Protocol(format!(
                "duplicate key ({}, {})",
                record.location_id, record.hour
            ))
            .into());
        }
        self.occupancy_inserts.fetch_add(1, Ordering::SeqCst);
        occupancy.push(OccupancyRecord {
            location_id: record.location_id,
            hour: record.hour,
            traffic_in: record.traffic_in,
            traffic_out: record.traffic_out,
            occupancy_min: record.occupancy_min,
            occupancy_max: record.occupancy_max,
            occupancy_avg: record.occupancy_avg,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.watermark.lock())
    }
}

pub fn engine(source: &Arc<FakeSource>, store: &Arc<FakeStore>) -> SyncEngine {
    let source: Arc<dyn SourceClient> = Arc::clone(source);
    let store: Arc<dyn TargetStore> = Arc::clone(store);
    SyncEngine::new(source, store)
}

/// An hour boundary on a fixed test day.
pub fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
}

pub fn record(location_id: i64, hour: DateTime<Utc>) -> NewOccupancyRecord {
    NewOccupancyRecord {
        location_id,
        hour,
        traffic_in: 5,
        traffic_out: 3,
        occupancy_min: 0,
        occupancy_max: 8,
        occupancy_avg: 4,
    }
}

pub fn source_location(
    location_id: i64,
    name: &str,
    src_updated_at: Option<DateTime<Utc>>,
) -> SourceLocation {
    SourceLocation {
        location_id,
        name: Some(name.to_string()),
        description: None,
        country: None,
        city: None,
        postal_code: None,
        state: None,
        street: None,
        timezone: None,
        latitude: None,
        longitude: None,
        src_created_at: None,
        src_updated_at,
    }
}

pub fn target_location(location_id: i64, updated_at: DateTime<Utc>) -> Location {
    Location {
        location_id,
        name: Some(format!("location-{location_id}")),
        description: None,
        country: None,
        city: None,
        postal_code: None,
        state: None,
        street: None,
        timezone: None,
        latitude: None,
        longitude: None,
        src_created_at: None,
        src_updated_at: None,
        created_at: updated_at,
        updated_at,
    }
}
