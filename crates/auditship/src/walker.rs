//! Hierarchy walking
//!
//! Visits server → database → subfolder directories in lexicographic order,
//! lazily initializing watermark entries and handing each subfolder to the
//! date folder processor. Failures are caught at the scope of the node that
//! raised them and recorded in the ledger, so one bad subtree never stops its
//! siblings. The single exception is a state-file error, which is fatal for
//! the whole run and passes straight through.

use crate::failures::FailureLedger;
use crate::processor::DateFolderProcessor;
use crate::state::StateStore;
use crate::storage::{DirectoryNode, ObjectStore};
use anyhow::{Context, Result};
use auditship_common::ShipError;
use std::sync::Arc;
use tracing::{info, warn};

/// True when the error is a state-file failure that must abort the run.
pub(crate) fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ShipError>()
        .is_some_and(ShipError::is_fatal)
}

pub struct HierarchyWalker {
    store: Arc<dyn ObjectStore>,
    processor: DateFolderProcessor,
    root_prefix: String,
}

impl HierarchyWalker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: DateFolderProcessor,
        root_prefix: String,
    ) -> Self {
        Self {
            store,
            processor,
            root_prefix,
        }
    }

    /// Walk every server under the root prefix.
    pub async fn walk(&self, state: &mut StateStore, failures: &mut FailureLedger) -> Result<()> {
        let servers = self
            .store
            .list_directories(&self.root_prefix)
            .await
            .context("Failed to list server directories")?;

        for server in servers {
            if let Err(e) = self.walk_server(&server, state, failures).await {
                if is_fatal(&e) {
                    return Err(e);
                }
                warn!(server = %server.prefix, error = format!("{e:#}"), "failed processing server");
                failures.record(&server.prefix, &e);
            }
        }

        Ok(())
    }

    async fn walk_server(
        &self,
        server: &DirectoryNode,
        state: &mut StateStore,
        failures: &mut FailureLedger,
    ) -> Result<()> {
        info!(server = %server.prefix, "processing audit logs for server");

        state.ensure_server(&server.name);
        let databases = self
            .store
            .list_directories(&server.prefix)
            .await
            .with_context(|| format!("Failed to list databases under {}", server.prefix))?;

        for database in databases {
            if let Err(e) = self.walk_database(server, &database, state, failures).await {
                if is_fatal(&e) {
                    return Err(e);
                }
                warn!(database = %database.prefix, error = format!("{e:#}"), "failed processing database");
                failures.record(&database.prefix, &e);
            }
        }

        info!(server = %server.prefix, "done processing audit logs for server");
        Ok(())
    }

    async fn walk_database(
        &self,
        server: &DirectoryNode,
        database: &DirectoryNode,
        state: &mut StateStore,
        failures: &mut FailureLedger,
    ) -> Result<()> {
        info!(database = %database.prefix, "processing audit logs for database");

        state.ensure_database(&server.name, &database.name);
        let subfolders = self
            .store
            .list_directories(&database.prefix)
            .await
            .with_context(|| format!("Failed to list subfolders under {}", database.prefix))?;

        for subfolder in subfolders {
            if let Err(e) = self
                .processor
                .process_subfolder(&subfolder, &server.name, &database.name, state)
                .await
            {
                if is_fatal(&e) {
                    return Err(e);
                }
                warn!(subfolder = %subfolder.prefix, error = format!("{e:#}"), "failed processing subfolder");
                failures.record(&subfolder.prefix, &e);
            }
        }

        info!(database = %database.prefix, "done processing audit logs for database");
        Ok(())
    }
}
