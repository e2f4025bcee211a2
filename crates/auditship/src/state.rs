//! Watermark state persistence
//!
//! The state file is the sole durable record of shipping progress: a
//! three-level `server → database → subfolder` mapping of [`WatermarkState`]
//! entries, serialized as a single JSON document. Entries are created lazily
//! on first sight of a directory and never deleted. A missing file means "no
//! prior state"; an unreadable or unwritable file is fatal for the run.

use auditship_common::ShipError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Progress marker for one server/database/subfolder leaf.
///
/// `(date, blob_name)` of the last blob considered seen for the leaf, the
/// blob's modification timestamp, and the event counter carried across runs
/// for the boundary blob. Field names in the persisted JSON keep the legacy
/// camelCase shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkState {
    pub date: String,
    pub blob_name: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub event_number: u64,
}

type SubfolderMap = BTreeMap<String, WatermarkState>;
type DatabaseMap = BTreeMap<String, SubfolderMap>;
type ServerMap = BTreeMap<String, DatabaseMap>;

/// Owns the nested watermark mapping and its persisted file.
///
/// Mutated only by the walk's control task; `ensure_*` and `update_leaf` are
/// the only mutators, and `save` replaces the file atomically.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    servers: ServerMap,
}

impl StateStore {
    /// Read the persisted state, or start empty if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ShipError> {
        let path = path.into();

        let servers = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ShipError::state(&path, format!("invalid state file: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no state file found, starting fresh");
                ServerMap::new()
            },
            Err(e) => return Err(ShipError::state(&path, e)),
        };

        Ok(Self { path, servers })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert an empty entry for a server seen for the first time.
    pub fn ensure_server(&mut self, server: &str) {
        self.servers.entry(server.to_string()).or_default();
    }

    /// Insert an empty entry for a database seen for the first time.
    pub fn ensure_database(&mut self, server: &str, database: &str) {
        self.servers
            .entry(server.to_string())
            .or_default()
            .entry(database.to_string())
            .or_default();
    }

    /// Return the watermark for a leaf, inserting a zero value on first
    /// sight. Idempotent.
    pub fn ensure_leaf(&mut self, server: &str, database: &str, subfolder: &str) -> WatermarkState {
        self.servers
            .entry(server.to_string())
            .or_default()
            .entry(database.to_string())
            .or_default()
            .entry(subfolder.to_string())
            .or_default()
            .clone()
    }

    pub fn leaf(&self, server: &str, database: &str, subfolder: &str) -> Option<&WatermarkState> {
        self.servers.get(server)?.get(database)?.get(subfolder)
    }

    /// Replace a leaf's watermark with an advanced value.
    pub fn update_leaf(
        &mut self,
        server: &str,
        database: &str,
        subfolder: &str,
        watermark: WatermarkState,
    ) {
        self.servers
            .entry(server.to_string())
            .or_default()
            .entry(database.to_string())
            .or_default()
            .insert(subfolder.to_string(), watermark);
    }

    /// Serialize the whole mapping and atomically replace the state file.
    ///
    /// Writes a sibling temp file first and renames it over the target, so a
    /// crash mid-write cannot leave a corrupt file behind.
    pub fn save(&self) -> Result<(), ShipError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ShipError::state(&self.path, e))?;
            }
        }

        let json = serde_json::to_vec_pretty(&self.servers)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(|e| ShipError::state(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| ShipError::state(&self.path, e))?;

        debug!(path = %self.path.display(), "state file saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_state_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("watermarks.json")
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(temp_state_path(&dir)).unwrap();
        assert!(store.leaf("srv", "db", "sf").is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_state_path(&dir);
        std::fs::write(&path, b"{not json").unwrap();

        let err = StateStore::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ensure_leaf_is_idempotent_and_zero_valued() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::load(temp_state_path(&dir)).unwrap();

        let first = store.ensure_leaf("srv01", "db1", "sf1");
        assert_eq!(first, WatermarkState::default());

        store.update_leaf(
            "srv01",
            "db1",
            "sf1",
            WatermarkState {
                date: "20230801".into(),
                blob_name: "a.json.gz".into(),
                last_modified: None,
                event_number: 42,
            },
        );

        // ensure_leaf must not reset an existing entry
        let second = store.ensure_leaf("srv01", "db1", "sf1");
        assert_eq!(second.date, "20230801");
        assert_eq!(second.event_number, 42);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_state_path(&dir);

        let ts = Utc.with_ymd_and_hms(2023, 8, 1, 12, 0, 0).unwrap();
        let mut store = StateStore::load(&path).unwrap();
        store.ensure_leaf("srv01", "db1", "sf1");
        store.update_leaf(
            "srv01",
            "db1",
            "sf1",
            WatermarkState {
                date: "20230801".into(),
                blob_name: "b.json.gz".into(),
                last_modified: Some(ts),
                event_number: 25_000,
            },
        );
        store.save().unwrap();

        let reloaded = StateStore::load(&path).unwrap();
        let leaf = reloaded.leaf("srv01", "db1", "sf1").unwrap();
        assert_eq!(leaf.date, "20230801");
        assert_eq!(leaf.blob_name, "b.json.gz");
        assert_eq!(leaf.last_modified, Some(ts));
        assert_eq!(leaf.event_number, 25_000);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_state_path(&dir);

        let mut store = StateStore::load(&path).unwrap();
        store.ensure_leaf("srv01", "db1", "sf1");
        store.save().unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["watermarks.json"]);
    }

    #[test]
    fn test_persisted_shape_uses_legacy_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_state_path(&dir);

        let mut store = StateStore::load(&path).unwrap();
        store.ensure_leaf("srv01", "db1", "sf1");
        store.save().unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let leaf = &json["srv01"]["db1"]["sf1"];
        assert_eq!(leaf["date"], "");
        assert_eq!(leaf["blobName"], "");
        assert_eq!(leaf["lastModified"], serde_json::Value::Null);
        assert_eq!(leaf["eventNumber"], 0);
    }

    #[test]
    fn test_intermediate_levels_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_state_path(&dir);

        let mut store = StateStore::load(&path).unwrap();
        store.ensure_server("srv01");
        store.ensure_database("srv01", "db1");
        store.save().unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(json["srv01"]["db1"].is_object());
    }
}
