//! Persisted state: pre-mutation snapshots, network history and text reports.
//!
//! The snapshot file has the shape `{"snapshots": {key: payload}, "written_at": {key: ts}}`
//! and only keeps the latest payload per key. The history file has the shape
//! `{"reports": [{"timestamp": .., ..}]}` and is append-only. Missing files are
//! treated as empty.
//!
//! Each write loads the whole document, changes one entry and rewrites the file.
//! The store assumes a single process at a time; concurrent writers are not
//! supported.

pub mod json_file;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::PathsConfig;
use json_file::{load_json, save_json};

/// Key holding the write time of each history entry, next to the per-target summaries
pub const HISTORY_TIMESTAMP_KEY: &str = "timestamp";

/// Errors raised while reading or persisting state
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One snapshot as seen by callers
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub key: String,
    pub payload: Value,
    /// Absent for entries written by older versions of the backup file
    pub written_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BackupDocument {
    #[serde(default)]
    snapshots: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    written_at: BTreeMap<String, DateTime<Utc>>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDocument {
    #[serde(default)]
    reports: Vec<Value>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Key/value snapshot store plus the network history log and report exporter
#[derive(Debug)]
pub struct SnapshotStore {
    backup_path: PathBuf,
    history_path: PathBuf,
    reports_dir: PathBuf,
    data: BackupDocument,
}

impl SnapshotStore {
    /// Open the store described by the configured paths
    pub fn open(paths: &PathsConfig) -> Result<Self, StoreError> {
        Self::with_paths(paths.backup_file(), paths.network_log(), &paths.reports_dir)
    }

    /// Open a store from explicit file locations
    pub fn with_paths(
        backup_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        reports_dir: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let backup_path = backup_path.into();
        let data: BackupDocument = load_json(&backup_path)?;
        debug!(
            "Loaded {} snapshot(s) from {}",
            data.snapshots.len(),
            backup_path.display()
        );

        Ok(Self {
            backup_path,
            history_path: history_path.into(),
            reports_dir: reports_dir.as_ref().to_path_buf(),
            data,
        })
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Store `payload` under `key`, replacing any previous payload, and persist
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, payload: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(payload).map_err(|source| StoreError::Serialize {
            what: format!("snapshot '{}'", key),
            source,
        })?;
        self.set_value(key, value)
    }

    /// Store an already-built JSON payload under `key` and persist.
    ///
    /// The in-memory view only changes once the file has been written.
    pub fn set_value(&mut self, key: &str, payload: Value) -> Result<(), StoreError> {
        if self.data.snapshots.contains_key(key) {
            debug!("Overwriting snapshot '{}'", key);
        }
        let mut next = self.data.clone();
        next.snapshots.insert(key.to_string(), payload);
        next.written_at.insert(key.to_string(), Utc::now());
        save_json(&self.backup_path, &next)?;
        self.data = next;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.snapshots.get(key)
    }

    /// Typed read; a payload that does not match `T` is logged and treated as absent
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Snapshot '{}' has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<SnapshotEntry> {
        self.get(key).map(|payload| SnapshotEntry {
            key: key.to_string(),
            payload: payload.clone(),
            written_at: self.data.written_at.get(key).copied(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.snapshots.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.snapshots.keys().map(String::as_str)
    }

    /// Append one composite network report to the history log.
    ///
    /// Returns the timestamp recorded with the entry.
    pub fn append_network_report(
        &self,
        report: Map<String, Value>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let timestamp = Utc::now();
        let mut history: HistoryDocument = load_json(&self.history_path)?;

        let mut entry = Map::new();
        entry.insert(
            HISTORY_TIMESTAMP_KEY.to_string(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        entry.extend(report);
        history.reports.push(Value::Object(entry));

        save_json(&self.history_path, &history)?;
        debug!(
            "Appended network report #{} to {}",
            history.reports.len(),
            self.history_path.display()
        );
        Ok(timestamp)
    }

    /// All history entries, oldest first
    pub fn network_reports(&self) -> Result<Vec<Value>, StoreError> {
        let history: HistoryDocument = load_json(&self.history_path)?;
        Ok(history.reports)
    }

    /// Write a plain-text report named `<name>_<UTC timestamp>.txt`
    pub fn export_report_text(&self, name: &str, content: &str) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.reports_dir).map_err(|source| StoreError::Write {
            path: self.reports_dir.clone(),
            source,
        })?;

        let path = self
            .reports_dir
            .join(format!("{}_{}.txt", name, Utc::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, content).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        info!("Report written to {}", path.display());
        Ok(path)
    }
}
