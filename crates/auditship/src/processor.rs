//! Date folder processing — the resume state machine
//!
//! For one subfolder leaf, walks its date folders in sorted order, decides
//! per blob whether it is new since the stored watermark, fans eligible blobs
//! out to the batch ingestor under a concurrency cap, and advances/persists
//! the watermark after every date folder so a crash loses at most the
//! in-flight folder.
//!
//! Skip rules, per date folder:
//! - strictly older than the watermark date: the whole folder is skipped;
//! - equal (the boundary date): blobs sorting before the watermark blob are
//!   skipped; the watermark blob itself is skipped only when its modification
//!   timestamp is unchanged, otherwise it is reprocessed with the event
//!   counter seeded from the stored value;
//! - newer: every matching blob is shipped.
//!
//! The watermark candidate is the last blob in *listing* order, never
//! completion order, and the event count comes from that blob's task.

use crate::batch::{BlobBatchIngestor, COMPRESSED_LOG_SUFFIX};
use crate::sink::EventSink;
use crate::state::StateStore;
use crate::storage::{DirectoryNode, ObjectStore};
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct DateFolderProcessor {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn EventSink>,
    batch_size: usize,
    max_concurrent_blobs: usize,
}

impl DateFolderProcessor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn EventSink>,
        batch_size: usize,
        max_concurrent_blobs: usize,
    ) -> Self {
        Self {
            store,
            sink,
            batch_size,
            max_concurrent_blobs,
        }
    }

    /// Ship everything new under one subfolder, saving the watermark after
    /// each completed date folder.
    ///
    /// On a blob or listing failure the error propagates immediately; later
    /// date folders of this subfolder are not visited, and watermark state
    /// already saved for earlier folders is retained.
    pub async fn process_subfolder(
        &self,
        subfolder: &DirectoryNode,
        server: &str,
        database: &str,
        state: &mut StateStore,
    ) -> Result<()> {
        info!(subfolder = %subfolder.prefix, "processing subfolder");

        let mut watermark = state.ensure_leaf(server, database, &subfolder.name);
        let mut last_blob = watermark.blob_name.clone();
        let mut last_modified = watermark.last_modified;

        let date_folders = self
            .store
            .list_directories(&subfolder.prefix)
            .await
            .with_context(|| format!("Failed to list date folders under {}", subfolder.prefix))?;

        for date_folder in date_folders {
            let current_date = date_folder.name.clone();
            let boundary = match current_date.as_str().cmp(watermark.date.as_str()) {
                // already fully processed
                Ordering::Less => {
                    debug!(date = %current_date, "skipping stale date folder");
                    continue;
                },
                Ordering::Equal => true,
                Ordering::Greater => false,
            };

            let blobs = self
                .store
                .list_blobs(&date_folder.prefix)
                .await
                .with_context(|| format!("Failed to list blobs under {}", date_folder.prefix))?;

            let semaphore = Arc::new(Semaphore::new(self.max_concurrent_blobs));
            let mut tasks: Vec<JoinHandle<Result<u64>>> = Vec::new();

            for blob in blobs {
                if !blob.name.to_ascii_lowercase().ends_with(COMPRESSED_LOG_SUFFIX) {
                    continue;
                }

                let mut event_offset = 0;
                if boundary {
                    match blob.name.as_str().cmp(watermark.blob_name.as_str()) {
                        // already sent
                        Ordering::Less => continue,
                        Ordering::Equal => {
                            if blob.last_modified == watermark.last_modified {
                                // identical content already sent
                                continue;
                            }
                            event_offset = watermark.event_number;
                        },
                        Ordering::Greater => {},
                    }
                }

                last_blob = blob.name.clone();
                last_modified = blob.last_modified;

                let ingestor = BlobBatchIngestor::new(
                    self.store.clone(),
                    self.sink.clone(),
                    self.batch_size,
                );
                let semaphore = semaphore.clone();
                tasks.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .context("blob concurrency semaphore closed")?;
                    ingestor.ship_blob(blob, event_offset).await
                }));
            }

            if tasks.is_empty() && boundary {
                // idempotent pass over the boundary date, nothing changed
                continue;
            }

            // Every task runs to completion before any failure surfaces.
            let mut next_event = None;
            let mut failure = None;
            for result in futures::future::join_all(tasks).await {
                match result {
                    Ok(Ok(count)) => next_event = Some(count),
                    Ok(Err(e)) => {
                        failure.get_or_insert(e);
                    },
                    Err(e) => {
                        failure.get_or_insert(anyhow::anyhow!("blob task panicked: {e}"));
                    },
                }
            }
            if let Some(e) = failure {
                return Err(e).with_context(|| {
                    format!("Failed shipping date folder {}", date_folder.prefix)
                });
            }

            watermark.blob_name = last_blob.clone();
            watermark.last_modified = last_modified;
            if current_date.as_str() >= watermark.date.as_str() {
                watermark.date = current_date;
            }
            if let Some(count) = next_event {
                watermark.event_number = count;
            }

            state.update_leaf(server, database, &subfolder.name, watermark.clone());
            state.save()?;
            debug!(subfolder = %subfolder.prefix, date = %watermark.date, "watermark saved");
        }

        info!(subfolder = %subfolder.prefix, "done processing subfolder");
        Ok(())
    }
}
