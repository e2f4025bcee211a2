//! Auditship Library
//!
//! Ships compressed audit-log archives from a hierarchical object-storage
//! layout (server → database → subfolder → date folder) into a log-analytics
//! ingestion endpoint, resuming across runs via a persisted watermark file.
//!
//! # Example
//!
//! ```no_run
//! use auditship::config::ShipConfig;
//! use auditship::shipper::Shipper;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ShipConfig::load()?;
//!     let shipper = Shipper::from_config(config).await?;
//!     let failures = shipper.run().await?;
//!     for failure in &failures {
//!         tracing::warn!("{}", failure);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod batch;
pub mod config;
pub mod failures;
pub mod processor;
pub mod shipper;
pub mod sink;
pub mod state;
pub mod storage;
pub mod usage;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_util;

pub use shipper::Shipper;
pub use state::{StateStore, WatermarkState};
