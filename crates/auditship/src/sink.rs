//! Ingestion endpoint client
//!
//! One [`EventSink::send`] call delivers one serialized batch. The HTTP
//! implementation owns the bounded retry policy for transient delivery
//! failures; callers never retry a batch themselves.

use crate::config::IngestConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use auditship_common::ShipError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Delivery of one JSON batch to the ingestion endpoint.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one batch, already serialized as a JSON array.
    async fn send(&self, batch_json: String) -> Result<()>;
}

/// HTTP [`EventSink`] with bearer authentication and bounded retry.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    retries: u32,
    retry_delay: Duration,
}

impl HttpEventSink {
    pub fn new(config: &IngestConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("Bearer token contains invalid header characters")?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .context("Failed to build ingestion HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn post_once(&self, batch_json: &str) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .header("x-correlation-id", Uuid::new_v4().to_string())
            .body(batch_json.to_string())
            .send()
            .await
            .context("Ingestion request failed")?
            .error_for_status()
            .context("Ingestion endpoint rejected batch")?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, batch_json: String) -> Result<()> {
        let mut last_error = None;

        for attempt in 1..=self.retries {
            match self.post_once(&batch_json).await {
                Ok(()) => {
                    debug!(bytes = batch_json.len(), attempt, "batch delivered");
                    return Ok(());
                },
                Err(e) => {
                    warn!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "batch delivery attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                },
            }
        }

        let reason = last_error
            .map(|e| format!("{e:#}"))
            .unwrap_or_else(|| "unknown".to_string());
        Err(ShipError::Ingestion(format!(
            "batch delivery failed after {} attempts: {reason}",
            self.retries
        ))
        .into())
    }
}
