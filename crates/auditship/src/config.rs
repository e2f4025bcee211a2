//! Configuration management

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

// ============================================================================
// Shipping Configuration Constants
// ============================================================================

/// Default path for the persisted watermark state file.
pub const DEFAULT_STATE_FILE: &str = "./state/watermarks.json";

/// Records per ingestion batch; bounds the payload size the endpoint accepts.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Maximum blobs ingested concurrently within one date folder.
pub const DEFAULT_MAX_CONCURRENT_BLOBS: usize = 16;

/// Default delivery attempts per batch send.
pub const DEFAULT_SEND_RETRIES: u32 = 3;

/// Default delay between delivery attempts in milliseconds.
pub const DEFAULT_SEND_RETRY_DELAY_MS: u64 = 1_000;

/// Default timeout for ingestion requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Shipping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipConfig {
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    /// Path of the watermark state file.
    pub state_path: PathBuf,
    /// Prefix under which the server directories live ("" = bucket root).
    pub root_prefix: String,
    pub batch_size: usize,
    pub max_concurrent_blobs: usize,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

/// Ingestion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// URL batches are POSTed to.
    pub endpoint: String,
    /// Static bearer token; takes precedence over the vault URL when both set.
    pub token: Option<String>,
    /// Vault-style secrets endpoint that yields the bearer token.
    pub vault_secret_url: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl ShipConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = ShipConfig {
            storage: StorageConfig::from_env()?,
            ingest: IngestConfig::from_env()?,
            state_path: env::var("AUDITSHIP_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_FILE)),
            root_prefix: env::var("AUDITSHIP_ROOT_PREFIX").unwrap_or_default(),
            batch_size: env::var("AUDITSHIP_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_concurrent_blobs: env::var("AUDITSHIP_MAX_CONCURRENT_BLOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONCURRENT_BLOBS),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.bucket.is_empty() {
            anyhow::bail!("Storage bucket cannot be empty");
        }

        if self.ingest.endpoint.is_empty() {
            anyhow::bail!("Ingestion endpoint URL cannot be empty");
        }

        if self.ingest.token.is_none() && self.ingest.vault_secret_url.is_none() {
            anyhow::bail!(
                "No credential source configured: set AUDITSHIP_INGEST_TOKEN or AUDITSHIP_VAULT_SECRET_URL"
            );
        }

        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.max_concurrent_blobs == 0 {
            anyhow::bail!("Max concurrent blobs must be greater than 0");
        }

        Ok(())
    }
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("AUDITSHIP_S3_ENDPOINT")
                .or_else(|_| env::var("S3_ENDPOINT"))
                .ok(),
            region: env::var("AUDITSHIP_S3_REGION")
                .or_else(|_| env::var("S3_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("AUDITSHIP_BUCKET").unwrap_or_default(),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: env::var("AUDITSHIP_S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("AUDITSHIP_INGEST_URL").unwrap_or_default(),
            token: env::var("AUDITSHIP_INGEST_TOKEN").ok(),
            vault_secret_url: env::var("AUDITSHIP_VAULT_SECRET_URL").ok(),
            timeout_secs: env::var("AUDITSHIP_INGEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            retries: env::var("AUDITSHIP_SEND_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SEND_RETRIES),
            retry_delay_ms: env::var("AUDITSHIP_SEND_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SEND_RETRY_DELAY_MS),
        })
    }
}
