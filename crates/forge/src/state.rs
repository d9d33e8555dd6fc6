//! Persisted build state
//!
//! One [`TargetRecord`] per target describes what its last build saw. Records
//! live behind the [`StateStore`] trait so that the change detector can be
//! driven by an in-memory store in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{SourceFile, combined_fingerprint};
use crate::{Error, Result};

/// Outcome of the recorded build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Build succeeded
    Success,
    /// Build failed
    Failed,
}

/// Fingerprints of one source as of the recorded build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub fingerprint: String,
    #[serde(default)]
    pub headers: BTreeMap<Utf8PathBuf, String>,
}

/// Build state of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Combined fingerprint of all sources, headers, options and dependencies
    pub fingerprint: String,
    /// Fingerprint of the effective options and toolchain
    pub option_fingerprint: String,
    /// Per-source fingerprints
    pub sources: BTreeMap<Utf8PathBuf, SourceRecord>,
    /// Fingerprint of each direct dependency's record, as linked against
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Artifact produced by the build
    pub artifact: Utf8PathBuf,
    /// Status of the build
    pub status: BuildStatus,
    /// When the build finished
    pub timestamp: DateTime<Utc>,
}

impl TargetRecord {
    /// Record the inputs a build saw, with its outcome
    pub fn new(
        sources: &[SourceFile],
        option_fingerprint: &str,
        dependencies: BTreeMap<String, String>,
        artifact: &Utf8Path,
        status: BuildStatus,
    ) -> Self {
        Self {
            fingerprint: combined_fingerprint(sources, option_fingerprint, &dependencies),
            option_fingerprint: option_fingerprint.to_string(),
            sources: sources
                .iter()
                .map(|source| {
                    (
                        source.path.clone(),
                        SourceRecord {
                            fingerprint: source.fingerprint.clone(),
                            headers: source.headers.clone(),
                        },
                    )
                })
                .collect(),
            dependencies,
            artifact: artifact.to_path_buf(),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}

/// Storage for target records.
///
/// Reads never fail: a missing or unreadable record means "no prior state".
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Record of the last build of `target`, if any
    fn read(&self, target: &str) -> Option<TargetRecord>;

    /// Replace the record of `target`
    fn write(&self, target: &str, record: &TargetRecord) -> Result<()>;
}

/// JSON files under `<state_dir>/state/<target>.json`
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: Utf8PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at the project's state directory
    pub fn new(state_dir: &Utf8Path) -> Self {
        Self {
            dir: state_dir.join("state"),
        }
    }

    /// Get the record file path for a target
    fn record_file(&self, target: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", target))
    }
}

impl StateStore for FileStateStore {
    fn read(&self, target: &str) -> Option<TargetRecord> {
        let path = self.record_file(target);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable build state {}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    "Ignoring corrupted build state {}: {}; {} will be rebuilt",
                    path,
                    e,
                    target
                );
                None
            }
        }
    }

    fn write(&self, target: &str, record: &TargetRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let content = serde_json::to_string_pretty(record).map_err(|e| {
            Error::state(
                format!("Failed to serialize build state for {}: {}", target, e),
                "This is likely a bug in forge",
            )
        })?;

        // Write then rename so an interrupted write never leaves a torn record
        let path = self.record_file(target);
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, TargetRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, TargetRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, target: &str) -> Option<TargetRecord> {
        self.records().get(target).cloned()
    }

    fn write(&self, target: &str, record: &TargetRecord) -> Result<()> {
        self.records().insert(target.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(status: BuildStatus) -> TargetRecord {
        let mut headers = BTreeMap::new();
        headers.insert(Utf8PathBuf::from("/p/a.h"), "h1".to_string());
        let sources = vec![SourceFile {
            path: Utf8PathBuf::from("/p/a.c"),
            fingerprint: "s1".to_string(),
            headers,
        }];
        let dependencies = BTreeMap::from([("core".to_string(), "c1".to_string())]);
        TargetRecord::new(
            &sources,
            "opts",
            dependencies,
            Utf8Path::new("/p/build/liba.a"),
            status,
        )
    }

    #[test]
    fn test_file_store_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = Utf8Path::from_path(temp_dir.path()).unwrap();
        let store = FileStateStore::new(state_dir);

        let saved = record(BuildStatus::Success);
        store.write("core", &saved).unwrap();
        let loaded = store.read("core").unwrap();

        assert_eq!(loaded, saved);
        assert!(loaded.is_success());
        assert!(state_dir.join("state/core.json").exists());
        assert!(!state_dir.join("state/core.json.tmp").exists());
    }

    #[test]
    fn test_file_store_missing_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::new(Utf8Path::from_path(temp_dir.path()).unwrap());

        assert!(store.read("nothing").is_none());
    }

    #[test]
    fn test_file_store_corrupt_record_reads_as_missing() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = Utf8Path::from_path(temp_dir.path()).unwrap();
        std::fs::create_dir_all(state_dir.join("state")).unwrap();
        std::fs::write(state_dir.join("state/core.json"), "{ not json").unwrap();

        let store = FileStateStore::new(state_dir);
        assert!(store.read("core").is_none());

        // The next write replaces the corrupted record
        store.write("core", &record(BuildStatus::Failed)).unwrap();
        assert_eq!(store.read("core").unwrap().status, BuildStatus::Failed);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty());

        store.write("app", &record(BuildStatus::Success)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.read("app").unwrap().artifact, "/p/build/liba.a");
        assert!(store.read("other").is_none());
    }

    #[test]
    fn test_record_serialization() {
        let json = serde_json::to_string(&record(BuildStatus::Failed)).unwrap();
        assert!(json.contains("\"failed\""));

        let parsed: TargetRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sources[Utf8Path::new("/p/a.c")].fingerprint, "s1");
        assert_eq!(parsed.dependencies["core"], "c1");
    }

    #[test]
    fn test_record_without_dependencies_field() {
        let mut value = serde_json::to_value(record(BuildStatus::Success)).unwrap();
        value.as_object_mut().unwrap().remove("dependencies");

        let parsed: TargetRecord = serde_json::from_value(value).unwrap();
        assert!(parsed.dependencies.is_empty());
    }
}
