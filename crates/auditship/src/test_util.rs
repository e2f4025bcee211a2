//! In-memory test doubles for the storage and ingestion collaborators.

use crate::sink::EventSink;
use crate::storage::{BlobDescriptor, DirectoryNode, ObjectStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Mutex;

/// Gzip arbitrary bytes.
pub(crate) fn gzip_bytes(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

/// Gzip `n` concatenated JSON records with no separators between them.
pub(crate) fn gzip_records(n: usize) -> Vec<u8> {
    let mut content = Vec::new();
    for i in 0..n {
        content
            .extend_from_slice(format!(r#"{{"event":{i},"action":"AUDIT_ACTION"}}"#).as_bytes());
    }
    gzip_bytes(&content)
}

/// Object store backed by a key → (content, last_modified) map.
///
/// Directory listings are derived from key prefixes the same way the S3
/// delimiter listing works; prefixes can be marked as failing to exercise
/// fault isolation.
#[derive(Default)]
pub(crate) struct MemoryObjectStore {
    blobs: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
    failing_prefixes: Vec<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &str, content: Vec<u8>, last_modified: DateTime<Utc>) {
        self.blobs.insert(key.to_string(), (content, last_modified));
    }

    /// Make every listing under `prefix` fail.
    pub fn fail_listings_under(&mut self, prefix: &str) {
        self.failing_prefixes.push(prefix.to_string());
    }

    fn check_listing(&self, prefix: &str) -> Result<()> {
        if self.failing_prefixes.iter().any(|p| prefix.starts_with(p.as_str())) {
            anyhow::bail!("injected listing failure for prefix {prefix}");
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_directories(&self, prefix: &str) -> Result<Vec<DirectoryNode>> {
        self.check_listing(prefix)?;

        let mut children = BTreeSet::new();
        for key in self.blobs.keys() {
            if let Some(rest) = key.strip_prefix(prefix) {
                if let Some((child, _)) = rest.split_once('/') {
                    children.insert(child.to_string());
                }
            }
        }

        Ok(children
            .into_iter()
            .map(|name| DirectoryNode {
                prefix: format!("{prefix}{name}/"),
                name,
            })
            .collect())
    }

    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobDescriptor>> {
        self.check_listing(prefix)?;

        Ok(self
            .blobs
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (_, last_modified))| BlobDescriptor {
                name: key.rsplit('/').next().unwrap_or_default().to_string(),
                key: key.clone(),
                last_modified: Some(*last_modified),
            })
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(key)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| anyhow::anyhow!("no such blob: {key}"))
    }
}

/// Sink that records every delivered batch.
#[derive(Default)]
pub(crate) struct RecordingSink {
    sends: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sends(&self) -> Vec<String> {
        self.sends.lock().unwrap().clone()
    }

    /// Record count of each delivered batch, in delivery order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.sends()
            .iter()
            .map(|batch| {
                serde_json::from_str::<Vec<serde_json::Value>>(batch)
                    .expect("sink received a non-array batch")
                    .len()
            })
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, batch_json: String) -> Result<()> {
        self.sends.lock().unwrap().push(batch_json);
        Ok(())
    }
}
