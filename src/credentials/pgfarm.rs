//! PGFarm service-account login.
//!
//! The database password is not static: the service account logs in with a
//! file-mounted secret and the connection password is derived from the
//! returned access token as `urn:md5:` + base64(md5(token)). The token is
//! long-lived relative to a run but rotates, so it goes through the same
//! cache as the Sensource token, with a larger refresh buffer.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::PgConfig;
use crate::credentials::{Credential, CredentialSource};
use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    expires_in: i64,
}

/// Fetches the PGFarm service-account token and derives the database
/// password from it.
pub struct PgFarmAuth {
    client: reqwest::Client,
    base_url: String,
    username: String,
    secret_file: PathBuf,
}

impl PgFarmAuth {
    pub fn new(config: &PgConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.pgfarm_url.clone(),
            username: config.user.clone(),
            secret_file: PathBuf::from(&config.password_file),
        }
    }

    fn password_hash(access_token: &str) -> String {
        let digest = md5::compute(access_token.as_bytes());
        format!("urn:md5:{}", BASE64.encode(digest.0))
    }
}

#[async_trait]
impl CredentialSource for PgFarmAuth {
    fn name(&self) -> &str {
        "pgfarm-service-account"
    }

    async fn fetch(&self) -> Result<Credential> {
        let secret = tokio::fs::read_to_string(&self.secret_file)
            .await
            .map_err(|e| {
                PipelineError::Credential(format!(
                    "reading service account secret {}: {e}",
                    self.secret_file.display()
                ))
            })?;
        let secret = secret.trim();

        let url = format!("{}/auth/service-account/login", self.base_url);
        info!(url = %url, username = %self.username, "requesting PGFarm service account token");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "username": self.username,
                "secret": secret,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Credential(format!("PGFarm login request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Credential(format!(
                "PGFarm login returned {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Credential(format!("PGFarm login payload: {e}")))?;

        info!(expires_in = body.expires_in, "got PGFarm service account token");

        Ok(Credential {
            token: Self::password_hash(&body.access_token),
            issued_at: Utc::now(),
            ttl: Duration::seconds(body.expires_in),
        })
    }
}
