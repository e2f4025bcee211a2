//! Bearer credential acquisition
//!
//! Consumed only when building the ingestion client; the shipping engine
//! itself never sees credentials.

use crate::config::IngestConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const VAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Yields the bearer credential for the ingestion endpoint, either from
/// configuration or fetched from a vault-style secrets endpoint.
pub enum TokenProvider {
    Static(String),
    Vault {
        client: reqwest::Client,
        secret_url: String,
    },
}

/// Wire shape of a vault secret response.
#[derive(Debug, Deserialize)]
struct SecretResponse {
    value: String,
}

impl TokenProvider {
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        if let Some(token) = &config.token {
            return Ok(TokenProvider::Static(token.clone()));
        }

        let secret_url = config
            .vault_secret_url
            .clone()
            .context("No credential source configured for the ingestion endpoint")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(VAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build vault HTTP client")?;

        Ok(TokenProvider::Vault { client, secret_url })
    }

    pub async fn get_token(&self) -> Result<String> {
        match self {
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::Vault { client, secret_url } => {
                let secret: SecretResponse = client
                    .get(secret_url)
                    .send()
                    .await
                    .context("Vault request failed")?
                    .error_for_status()
                    .context("Vault rejected secret request")?
                    .json()
                    .await
                    .context("Vault returned an invalid secret document")?;

                Ok(secret.value)
            },
        }
    }
}
