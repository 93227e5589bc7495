//! Sensource API client.
//!
//! Hourly data comes from two endpoints: `data/traffic` carries the in/out
//! counts and `data/occupancy` the min/max/avg occupancy. Both group by
//! location and hour, so the client merges them into one record per
//! `(location_id, hour)` before handing them to the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::SensourceConfig;
use crate::credentials::CredentialCache;
use crate::error::{PipelineError, Result};
use crate::models::{NewOccupancyRecord, SourceLocation, Window};
use crate::source::SourceClient;

/// Envelope used by the Sensource data endpoints.
#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    results: Option<Vec<T>>,
    messages: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TrafficRow {
    #[serde(rename = "locationId")]
    location_id: i64,
    #[serde(rename = "recordDate_hour_1")]
    record_hour: String,
    #[serde(rename = "sumins")]
    sum_ins: Option<f64>,
    #[serde(rename = "sumouts")]
    sum_outs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OccupancyRow {
    #[serde(rename = "locationId")]
    location_id: i64,
    #[serde(rename = "recordDate_hour_1")]
    record_hour: String,
    #[serde(rename = "minoccupancy")]
    min_occupancy: Option<f64>,
    #[serde(rename = "maxoccupancy")]
    max_occupancy: Option<f64>,
    #[serde(rename = "avgoccupancy")]
    avg_occupancy: Option<f64>,
}

/// Authenticated client for the Sensource API.
pub struct SensourceClient {
    client: reqwest::Client,
    api_url: String,
    token: Arc<CredentialCache>,
}

impl SensourceClient {
    pub fn new(config: &SensourceConfig, token: Arc<CredentialCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            token,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let token = self.token.get().await?;
        let url = format!("{}/{}", self.api_url, path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| PipelineError::Upstream(format!("GET {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Upstream(format!(
                "GET {path} returned {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::Upstream(format!("GET {path} payload: {e}")))
    }

    fn window_query(window: Window, metrics: &str) -> Vec<(&'static str, String)> {
        vec![
            ("relationType", "location".to_string()),
            ("dateGroupings", "hour".to_string()),
            ("metrics", metrics.to_string()),
            (
                "startDate",
                window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "endDate",
                window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ]
    }

    fn unwrap_results<T>(path: &str, response: DataResponse<T>) -> Result<Vec<T>> {
        if let Some(messages) = &response.messages {
            if !messages.is_empty() {
                info!(path, ?messages, "messages from Sensource data call");
            }
        }
        response.results.ok_or_else(|| {
            PipelineError::Upstream(format!("results array not found in {path} response"))
        })
    }
}

/// Parse an upstream hour stamp and truncate it to the hour boundary.
/// Accepts RFC 3339 or a bare `YYYY-MM-DDTHH:MM:SS[.fff]` treated as UTC.
pub(crate) fn parse_hour(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .map_err(|e| PipelineError::Upstream(format!("unparseable hour stamp {raw:?}: {e}")))?;

    Ok(truncate_to_hour(parsed))
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

fn round_metric(value: Option<f64>) -> i32 {
    value.unwrap_or(0.0).round() as i32
}

#[async_trait]
impl SourceClient for SensourceClient {
    async fn list_locations(&self) -> Result<Vec<SourceLocation>> {
        info!("getting locations from Sensource");
        let locations: Vec<SourceLocation> = self.get_json("location", &[]).await?;
        info!(count = locations.len(), "got locations from Sensource");
        Ok(locations)
    }

    async fn list_occupancy(&self, window: Window) -> Result<Vec<NewOccupancyRecord>> {
        info!(start = %window.start, end = %window.end, "getting traffic data from Sensource");
        let traffic: DataResponse<TrafficRow> = self
            .get_json("data/traffic", &Self::window_query(window, "ins,outs"))
            .await?;
        let traffic = Self::unwrap_results("data/traffic", traffic)?;

        info!(start = %window.start, end = %window.end, "getting occupancy data from Sensource");
        let occupancy: DataResponse<OccupancyRow> = self
            .get_json(
                "data/occupancy",
                &Self::window_query(window, "occupancy(max),occupancy(min),occupancy(avg)"),
            )
            .await?;
        let occupancy = Self::unwrap_results("data/occupancy", occupancy)?;

        let mut merged: HashMap<(i64, DateTime<Utc>), NewOccupancyRecord> = HashMap::new();

        for row in traffic {
            let hour = parse_hour(&row.record_hour)?;
            merged.insert(
                (row.location_id, hour),
                NewOccupancyRecord {
                    location_id: row.location_id,
                    hour,
                    traffic_in: round_metric(row.sum_ins),
                    traffic_out: round_metric(row.sum_outs),
                    occupancy_min: 0,
                    occupancy_max: 0,
                    occupancy_avg: 0,
                },
            );
        }

        for row in occupancy {
            let hour = parse_hour(&row.record_hour)?;
            let entry = merged
                .entry((row.location_id, hour))
                .or_insert_with(|| NewOccupancyRecord {
                    location_id: row.location_id,
                    hour,
                    traffic_in: 0,
                    traffic_out: 0,
                    occupancy_min: 0,
                    occupancy_max: 0,
                    occupancy_avg: 0,
                });
            entry.occupancy_min = round_metric(row.min_occupancy);
            entry.occupancy_max = round_metric(row.max_occupancy);
            entry.occupancy_avg = round_metric(row.avg_occupancy);
        }

        if merged.is_empty() {
            warn!(start = %window.start, end = %window.end, "no hourly data in window");
        }

        let records: Vec<NewOccupancyRecord> = merged.into_values().collect();
        info!(count = records.len(), "merged hourly data from Sensource");
        Ok(records)
    }
}
