//! # Reconciliation Engine
//!
//! Computes and applies the minimal diff between the Sensource API and the
//! target store: an upsert pass over locations, then an incremental,
//! watermark-bounded insert pass over hourly occupancy rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{NewOccupancyRecord, Window};
use crate::source::SourceClient;
use crate::store::TargetStore;

/// Per-run options carried from the manual trigger. Scheduled runs use the
/// defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Counts reported back to the orchestrator after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub locations_inserted: usize,
    pub locations_updated: usize,
    pub locations_skipped: usize,
    pub rows_considered: usize,
    pub rows_inserted: usize,
}

pub struct SyncEngine {
    source: Arc<dyn SourceClient>,
    store: Arc<dyn TargetStore>,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn SourceClient>, store: Arc<dyn TargetStore>) -> Self {
        Self { source, store }
    }

    /// One full reconciliation pass. Any error aborts the run immediately;
    /// location writes and occupancy writes are separate statements, so a
    /// failure between the two passes leaves updated locations with stale
    /// occupancy until the next trigger.
    pub async fn run(&self, opts: &SyncOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        self.sync_locations(&mut report).await?;

        let window = self.resolve_window(opts).await?;
        info!(start = %window.start, end = %window.end, "resolved occupancy window");

        let mut records = self.source.list_occupancy(window).await?;
        records.sort_by_key(|record| (record.hour, record.location_id));

        if opts.end_date.is_none() {
            trim_trailing_hour(&mut records);
        }

        self.insert_missing(window, records, &mut report).await?;

        info!(
            locations_inserted = report.locations_inserted,
            locations_updated = report.locations_updated,
            locations_skipped = report.locations_skipped,
            rows_considered = report.rows_considered,
            rows_inserted = report.rows_inserted,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Upsert pass over locations. For every source location exactly one of
    /// insert, update, or skip happens; rows are never deleted.
    async fn sync_locations(&self, report: &mut SyncReport) -> Result<()> {
        info!("updating locations");
        let source_locations = self.source.list_locations().await?;
        let existing = self.store.list_locations().await?;
        let existing: HashMap<i64, _> = existing
            .into_iter()
            .map(|location| (location.location_id, location))
            .collect();

        for source_location in &source_locations {
            match existing.get(&source_location.location_id) {
                None => {
                    self.store.insert_location(source_location).await?;
                    report.locations_inserted += 1;
                }
                Some(target) if source_location.is_newer_than(target) => {
                    self.store.update_location(source_location).await?;
                    report.locations_updated += 1;
                }
                Some(_) => {
                    report.locations_skipped += 1;
                }
            }
        }

        info!(
            inserted = report.locations_inserted,
            updated = report.locations_updated,
            skipped = report.locations_skipped,
            "locations synced"
        );
        Ok(())
    }

    /// Resolve the fetch window. Without an explicit start the target's
    /// watermark bounds the query; an empty store with no explicit start
    /// has no bound at all, which is a configuration error rather than an
    /// unbounded fetch.
    async fn resolve_window(&self, opts: &SyncOptions) -> Result<Window> {
        let start = match opts.start_date {
            Some(start) => start,
            None => self.store.watermark().await?.ok_or_else(|| {
                PipelineError::Configuration(
                    "no occupancy watermark in the target store and no explicit start date given"
                        .to_string(),
                )
            })?,
        };
        let end = opts.end_date.unwrap_or_else(Utc::now);
        Ok(Window { start, end })
    }

    /// Insert source rows absent from the target, one at a time in hour
    /// order, so backpressure on the single connection stays predictable.
    async fn insert_missing(
        &self,
        window: Window,
        records: Vec<NewOccupancyRecord>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let existing: HashSet<(i64, DateTime<Utc>)> = self
            .store
            .list_occupancy(window)
            .await?
            .iter()
            .map(|record| record.key())
            .collect();

        report.rows_considered = records.len();
        for record in &records {
            if existing.contains(&record.key()) {
                continue;
            }
            self.store.insert_occupancy(record).await?;
            report.rows_inserted += 1;
        }
        Ok(())
    }
}

/// Drop every record in the most recent hour of the fetched set. That hour
/// may still be an incomplete aggregate upstream; the next run re-fetches
/// it once it has settled, which keeps runs idempotent.
fn trim_trailing_hour(records: &mut Vec<NewOccupancyRecord>) {
    let Some(max_hour) = records.iter().map(|record| record.hour).max() else {
        return;
    };
    let before = records.len();
    records.retain(|record| record.hour != max_hour);
    info!(
        trailing_hour = %max_hour,
        trimmed = before - records.len(),
        "trimmed trailing hour"
    );
}

/// Parse an operator-supplied date bound: RFC 3339, or a bare date taken
/// as midnight UTC.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    warn!(raw, "unparseable date bound");
    Err(PipelineError::Configuration(format!(
        "unparseable date: {raw:?} (expected RFC 3339 or YYYY-MM-DD)"
    )))
}
