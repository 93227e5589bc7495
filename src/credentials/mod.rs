//! # Expiring Credentials
//!
//! A single-flight cache over an expiring bearer credential, instantiated
//! once for the Sensource OAuth token and once for the PGFarm
//! service-account password. Both upstreams hand out short-lived secrets,
//! so every outbound call checks the cache and concurrent callers must not
//! stampede the auth endpoints.

pub mod cache;
pub mod pgfarm;
pub mod sensource;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

pub use cache::CredentialCache;
pub use pgfarm::PgFarmAuth;
pub use sensource::SensourceAuth;

/// An ephemeral bearer credential. Never persisted; recomputed per process
/// lifetime.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Credential {
    /// The instant at which the credential should be refreshed: actual
    /// expiry pulled forward by the refresh buffer.
    pub fn effective_expiry(&self, refresh_buffer: Duration) -> DateTime<Utc> {
        self.issued_at + self.ttl - refresh_buffer
    }

    pub fn is_valid(&self, refresh_buffer: Duration, now: DateTime<Utc>) -> bool {
        now < self.effective_expiry(refresh_buffer)
    }
}

/// One upstream authentication flow. Implementations perform the actual
/// network exchange; the cache decides when to call them.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short identifier used in log fields.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Credential>;
}
