use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A gate-counted location as stored in `occupancy.location`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub location_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub street: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub src_created_at: Option<DateTime<Utc>>,
    pub src_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A location as returned by the Sensource `location` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(rename = "locationId")]
    pub location_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    #[serde(rename = "postalCode")]
    pub postal_code: Option<String>,
    pub state: Option<String>,
    pub street: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "createdAt")]
    pub src_created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt")]
    pub src_updated_at: Option<DateTime<Utc>>,
}

impl SourceLocation {
    /// Last-writer-wins by source time: the local row is only overwritten
    /// when the upstream edit is strictly newer than the local write.
    pub fn is_newer_than(&self, target: &Location) -> bool {
        match self.src_updated_at {
            Some(src_updated_at) => src_updated_at > target.updated_at,
            None => false,
        }
    }
}

const LOCATION_COLUMNS: &str = "location_id, name, description, country, city, postal_code, \
     state, street, timezone, latitude, longitude, src_created_at, src_updated_at, \
     created_at, updated_at";

impl Location {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Location>, sqlx::Error> {
        let sql = format!("SELECT {LOCATION_COLUMNS} FROM occupancy.location ORDER BY location_id");
        sqlx::query_as::<_, Location>(&sql).fetch_all(pool).await
    }

    pub async fn insert(pool: &PgPool, source: &SourceLocation) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO occupancy.location \
             (location_id, name, description, country, city, postal_code, state, street, \
              timezone, latitude, longitude, src_created_at, src_updated_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())",
        )
        .bind(source.location_id)
        .bind(&source.name)
        .bind(&source.description)
        .bind(&source.country)
        .bind(&source.city)
        .bind(&source.postal_code)
        .bind(&source.state)
        .bind(&source.street)
        .bind(&source.timezone)
        .bind(source.latitude)
        .bind(source.longitude)
        .bind(source.src_created_at)
        .bind(source.src_updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update(pool: &PgPool, source: &SourceLocation) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE occupancy.location SET \
             name = $2, description = $3, country = $4, city = $5, postal_code = $6, \
             state = $7, street = $8, timezone = $9, latitude = $10, longitude = $11, \
             src_created_at = $12, src_updated_at = $13, updated_at = NOW() \
             WHERE location_id = $1",
        )
        .bind(source.location_id)
        .bind(&source.name)
        .bind(&source.description)
        .bind(&source.country)
        .bind(&source.city)
        .bind(&source.postal_code)
        .bind(&source.state)
        .bind(&source.street)
        .bind(&source.timezone)
        .bind(source.latitude)
        .bind(source.longitude)
        .bind(source.src_created_at)
        .bind(source.src_updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
