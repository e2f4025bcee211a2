//! Object storage access
//!
//! The engine never manipulates storage bytes directly; it sees directories
//! and blobs through the [`ObjectStore`] trait and hands blob content to the
//! batch ingestor. The production implementation is S3-compatible and maps
//! the hierarchy onto key prefixes with `/` as the delimiter.

use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// A virtual directory: a common key prefix one level below its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Final path segment, e.g. `"20230801"` for prefix `"srv/db/sf/20230801/"`.
    pub name: String,
    /// Full prefix including the trailing delimiter.
    pub prefix: String,
}

/// A blob's listing metadata. Content is fetched separately by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    /// Final path segment, e.g. `"a.json.gz"`.
    pub name: String,
    /// Full object key.
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Read-only view of the audit-log container.
///
/// Both listing operations return entries sorted by name; the resume logic
/// depends on that order.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the immediate child directories under a prefix, sorted by name.
    async fn list_directories(&self, prefix: &str) -> Result<Vec<DirectoryNode>>;

    /// List all blobs under a prefix (recursively), sorted by key.
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobDescriptor>>;

    /// Download a blob's full content.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// S3-compatible [`ObjectStore`] over one bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing object store with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "auditship-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Object store client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_directories(&self, prefix: &str) -> Result<Vec<DirectoryNode>> {
        debug!("Listing directories under s3://{}/{}", self.bucket, prefix);

        let mut directories = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/");

            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to list directories under {prefix}"))?;

            for common_prefix in response.common_prefixes() {
                if let Some(p) = common_prefix.prefix() {
                    directories.push(DirectoryNode {
                        name: leaf_name(p),
                        prefix: p.to_string(),
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation = response.next_continuation_token().map(|t| t.to_string());
            } else {
                break;
            }
        }

        directories.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        Ok(directories)
    }

    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobDescriptor>> {
        debug!("Listing blobs under s3://{}/{}", self.bucket, prefix);

        let mut blobs = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to list blobs under {prefix}"))?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                blobs.push(BlobDescriptor {
                    name: leaf_name(key),
                    key: key.to_string(),
                    last_modified: object
                        .last_modified()
                        .and_then(|dt| chrono::DateTime::parse_from_rfc3339(&dt.to_string()).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation = response.next_continuation_token().map(|t| t.to_string());
            } else {
                break;
            }
        }

        blobs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(blobs)
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download blob: {key}"))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read blob body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }
}

/// Final path segment of a key or prefix, ignoring a trailing delimiter.
fn leaf_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
