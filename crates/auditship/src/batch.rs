//! Blob batch ingestion
//!
//! Turns one compressed audit-log blob into ingestion batches: decompress,
//! parse the content as a sequence of concatenated JSON records (no
//! separators required between them), chunk into fixed-size batches, and
//! deliver each batch through the sink. Everything happens in memory; no
//! temporary files are written.

use crate::sink::EventSink;
use crate::storage::{BlobDescriptor, ObjectStore};
use anyhow::{Context, Result};
use auditship_common::ShipError;
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Blob name suffix the shipper considers a compressed log file.
pub const COMPRESSED_LOG_SUFFIX: &str = ".json.gz";

/// Ships one blob's records to the ingestion endpoint in fixed-size batches.
#[derive(Clone)]
pub struct BlobBatchIngestor {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn EventSink>,
    batch_size: usize,
}

impl BlobBatchIngestor {
    pub fn new(store: Arc<dyn ObjectStore>, sink: Arc<dyn EventSink>, batch_size: usize) -> Self {
        Self {
            store,
            sink,
            batch_size,
        }
    }

    /// Download, decompress, parse and deliver one blob.
    ///
    /// `event_offset` seeds the running event counter (non-zero only for a
    /// resumed boundary blob); the return value is the offset plus every
    /// delivered record, and becomes the leaf's next `event_number`.
    pub async fn ship_blob(&self, blob: BlobDescriptor, event_offset: u64) -> Result<u64> {
        info!(blob = %blob.key, "processing blob");

        match self.ship_inner(&blob, event_offset).await {
            Ok(count) => {
                info!(blob = %blob.key, events = count, "done processing blob");
                Ok(count)
            },
            Err(e) => {
                error!(blob = %blob.key, error = format!("{e:#}"), "failed processing blob");
                Err(e)
            },
        }
    }

    async fn ship_inner(&self, blob: &BlobDescriptor, event_offset: u64) -> Result<u64> {
        let compressed = self
            .store
            .fetch(&blob.key)
            .await
            .with_context(|| format!("Failed to download blob: {}", blob.key))?;

        let decompressed = decompress_gzip(&compressed)?;
        let records = parse_concatenated_records(&decompressed)
            .with_context(|| format!("Failed to parse records in blob: {}", blob.key))?;

        let mut event_number = event_offset;
        for chunk in records.chunks(self.batch_size) {
            let payload = serde_json::to_string(chunk)
                .context("Failed to serialize ingestion batch")?;
            self.sink
                .send(payload)
                .await
                .with_context(|| format!("Failed to deliver batch for blob: {}", blob.key))?;
            event_number += chunk.len() as u64;
            debug!(blob = %blob.key, batch = chunk.len(), total = event_number, "batch sent");
        }

        Ok(event_number)
    }
}

/// Decompress gzip-compressed data fully into memory.
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, ShipError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ShipError::Decompress(e.to_string()))?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

/// Parse a byte stream of consecutive JSON objects.
///
/// The records are framed only by JSON syntax itself: `{..}{..}{..}` with or
/// without whitespace in between. Not an array, not strictly line-delimited.
fn parse_concatenated_records(data: &[u8]) -> Result<Vec<serde_json::Value>> {
    let mut records = Vec::new();
    for record in serde_json::Deserializer::from_slice(data).into_iter::<serde_json::Value>() {
        records.push(record.context("Invalid JSON record")?);
    }
    Ok(records)
}
