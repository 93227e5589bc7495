//! OAuth client-credentials flow against the Sensource auth endpoint.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::SensourceConfig;
use crate::credentials::{Credential, CredentialSource};
use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Fetches the Sensource API bearer token.
pub struct SensourceAuth {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl SensourceAuth {
    pub fn new(config: &SensourceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

#[async_trait]
impl CredentialSource for SensourceAuth {
    fn name(&self) -> &str {
        "sensource-oauth"
    }

    async fn fetch(&self) -> Result<Credential> {
        info!(auth_url = %self.auth_url, "requesting Sensource token");

        let response = self
            .client
            .post(&self.auth_url)
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "grant_type": "client_credentials",
            }))
            .send()
            .await
            .map_err(|e| PipelineError::Credential(format!("Sensource token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Credential(format!(
                "Sensource token request returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Credential(format!("Sensource token payload: {e}")))?;

        info!(expires_in = body.expires_in, "got Sensource token");

        Ok(Credential {
            token: body.access_token,
            issued_at: Utc::now(),
            ttl: Duration::seconds(body.expires_in),
        })
    }
}
