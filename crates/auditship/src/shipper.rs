//! Run orchestration
//!
//! Wires the authenticated ingestion sink, the object store and the watermark
//! store together, walks the whole hierarchy, flushes the state file at the
//! end and reports collected failures.

use crate::auth::TokenProvider;
use crate::config::ShipConfig;
use crate::failures::{FailureLedger, FailureRecord};
use crate::processor::DateFolderProcessor;
use crate::sink::{EventSink, HttpEventSink};
use crate::state::StateStore;
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::walker::HierarchyWalker;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Shipper {
    config: ShipConfig,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn EventSink>,
}

impl Shipper {
    /// Build the production shipper: bearer token, HTTP sink, S3 store.
    pub async fn from_config(config: ShipConfig) -> Result<Self> {
        let token = TokenProvider::from_config(&config.ingest)?.get_token().await?;
        let sink = Arc::new(HttpEventSink::new(&config.ingest, &token)?);
        let store = Arc::new(S3ObjectStore::new(config.storage.clone()).await?);
        Ok(Self::new(config, store, sink))
    }

    pub fn new(config: ShipConfig, store: Arc<dyn ObjectStore>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            store,
            sink,
        }
    }

    /// Execute one shipping run.
    ///
    /// Returns the failure records collected along the way; the run itself
    /// only errors when the state file cannot be loaded or written.
    pub async fn run(&self) -> Result<Vec<FailureRecord>> {
        info!("sending audit logs to the ingestion endpoint");

        let mut state = StateStore::load(&self.config.state_path)?;
        let mut failures = FailureLedger::new();

        let processor = DateFolderProcessor::new(
            self.store.clone(),
            self.sink.clone(),
            self.config.batch_size,
            self.config.max_concurrent_blobs,
        );
        let walker = HierarchyWalker::new(
            self.store.clone(),
            processor,
            self.config.root_prefix.clone(),
        );

        walker.walk(&mut state, &mut failures).await?;

        info!(path = %state.path().display(), "finished processing, saving the state file");
        state.save()?;

        if !failures.is_empty() {
            warn!(count = failures.len(), "run completed with failures");
        }

        Ok(failures.drain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestConfig, StorageConfig};
    use crate::test_util::{gzip_records, MemoryObjectStore, RecordingSink};
    use chrono::{TimeZone, Utc};
    use std::path::Path;

    fn ts(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 1, hour, 0, 0).unwrap()
    }

    fn test_config(state_path: &Path) -> ShipConfig {
        ShipConfig {
            storage: StorageConfig::for_minio("http://localhost:9000", "audit-logs"),
            ingest: IngestConfig {
                endpoint: "http://localhost:8080/ingest".to_string(),
                token: Some("secret".to_string()),
                vault_secret_url: None,
                timeout_secs: 30,
                retries: 3,
                retry_delay_ms: 10,
            },
            state_path: state_path.to_path_buf(),
            root_prefix: String::new(),
            batch_size: 10_000,
            max_concurrent_blobs: 4,
        }
    }

    fn seeded_store() -> MemoryObjectStore {
        let mut store = MemoryObjectStore::new();
        store.put("server/database/subfolder/20230801/a.json.gz", gzip_records(2), ts(1));
        store.put("server/database/subfolder/20230801/b.json.gz", gzip_records(3), ts(2));
        store.put("server/database/subfolder/20230802/a.json.gz", gzip_records(4), ts(3));
        store.put("server/database/subfolder/20230802/b.json.gz", gzip_records(5), ts(4));
        store
    }

    #[tokio::test]
    async fn test_end_to_end_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("watermarks.json");
        let sink = Arc::new(RecordingSink::new());

        let shipper = Shipper::new(
            test_config(&state_path),
            Arc::new(seeded_store()),
            sink.clone(),
        );
        let failures = shipper.run().await.unwrap();

        assert!(failures.is_empty());
        assert_eq!(sink.total_records(), 14);

        let state = StateStore::load(&state_path).unwrap();
        let leaf = state.leaf("server", "database", "subfolder").unwrap();
        assert_eq!(leaf.date, "20230802");
        assert_eq!(leaf.blob_name, "b.json.gz");

        // persisted document carries the full nested path
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&state_path).unwrap()).unwrap();
        assert!(json["server"]["database"]["subfolder"].is_object());
    }

    #[tokio::test]
    async fn test_second_run_with_no_new_data_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("watermarks.json");
        let sink = Arc::new(RecordingSink::new());

        let shipper = Shipper::new(
            test_config(&state_path),
            Arc::new(seeded_store()),
            sink.clone(),
        );
        shipper.run().await.unwrap();
        let sends_after_first = sink.sends().len();
        let watermark_after_first = StateStore::load(&state_path)
            .unwrap()
            .leaf("server", "database", "subfolder")
            .cloned();

        shipper.run().await.unwrap();

        assert_eq!(sink.sends().len(), sends_after_first);
        let watermark_after_second = StateStore::load(&state_path)
            .unwrap()
            .leaf("server", "database", "subfolder")
            .cloned();
        assert_eq!(watermark_after_first, watermark_after_second);
    }

    #[tokio::test]
    async fn test_monotonic_resume_only_ships_new_data() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("watermarks.json");

        let first_sink = Arc::new(RecordingSink::new());
        Shipper::new(
            test_config(&state_path),
            Arc::new(seeded_store()),
            first_sink.clone(),
        )
        .run()
        .await
        .unwrap();
        assert_eq!(first_sink.total_records(), 14);

        // a new date folder appears between runs
        let mut store = seeded_store();
        store.put("server/database/subfolder/20230803/a.json.gz", gzip_records(6), ts(5));

        let second_sink = Arc::new(RecordingSink::new());
        Shipper::new(test_config(&state_path), Arc::new(store), second_sink.clone())
            .run()
            .await
            .unwrap();

        // nothing before the watermark is re-delivered
        assert_eq!(second_sink.total_records(), 6);

        let state = StateStore::load(&state_path).unwrap();
        let leaf = state.leaf("server", "database", "subfolder").unwrap();
        assert_eq!(leaf.date, "20230803");
        assert_eq!(leaf.blob_name, "a.json.gz");
        assert_eq!(leaf.event_number, 6);
    }

    #[tokio::test]
    async fn test_run_fails_when_state_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("watermarks.json");
        std::fs::write(&state_path, b"{broken").unwrap();

        let shipper = Shipper::new(
            test_config(&state_path),
            Arc::new(seeded_store()),
            Arc::new(RecordingSink::new()),
        );

        assert!(shipper.run().await.is_err());
    }

    #[tokio::test]
    async fn test_final_save_persists_lazy_markers() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("watermarks.json");

        // subfolder exists but holds no date folders
        let mut store = MemoryObjectStore::new();
        store.put("server/database/empty_sf/marker.txt", b"x".to_vec(), ts(1));

        let sink = Arc::new(RecordingSink::new());
        Shipper::new(test_config(&state_path), Arc::new(store), sink.clone())
            .run()
            .await
            .unwrap();

        assert!(sink.sends().is_empty());

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&state_path).unwrap()).unwrap();
        assert_eq!(json["server"]["database"]["empty_sf"]["eventNumber"], 0);
    }
}
