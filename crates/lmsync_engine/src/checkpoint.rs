//! File-backed checkpoint store.

use crate::error::{SyncError, SyncResult};
use crate::store::CheckpointStore;
use lmsync_protocol::{Checkpoint, Seq};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A checkpoint store persisted as a JSON file.
///
/// The file is an array of [`Checkpoint`] records, e.g.
/// `[{"source_id": "altermap-main", "seq": "1042"}]`. Writes go through
/// a temporary file and an atomic rename so an interrupted save never
/// leaves a half-written state file behind.
#[derive(Debug)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, Seq>>,
}

impl JsonFileCheckpointStore {
    /// Opens (or initializes) the state file at `path`.
    ///
    /// A missing file is an empty store; a present but unparsable file is
    /// an error, because silently starting from zero would re-process the
    /// sources' entire history.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<Checkpoint> = serde_json::from_slice(&bytes).map_err(|e| {
                    SyncError::checkpoint("*", format!("cannot parse {}: {e}", path.display()))
                })?;
                list.into_iter().map(|c| (c.source_id, c.seq)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SyncError::checkpoint(
                    "*",
                    format!("cannot read {}: {e}", path.display()),
                ))
            }
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// The state file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<String, Seq>, source_id: &str) -> SyncResult<()> {
        let fail = |message: String| SyncError::checkpoint(source_id, message);

        let list: Vec<Checkpoint> = records
            .iter()
            .map(|(id, seq)| Checkpoint::new(id.clone(), seq.clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&list).map_err(|e| fail(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| fail(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| fail(format!("cannot rename into {}: {e}", self.path.display())))
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn load(&self, source_id: &str) -> SyncResult<Option<Seq>> {
        Ok(self.records.lock().get(source_id).cloned())
    }

    fn save(&self, source_id: &str, seq: &Seq) -> SyncResult<()> {
        let mut records = self.records.lock();
        records.insert(source_id.to_string(), seq.clone());
        self.persist(&records, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CheckpointStore;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(store.load("am").unwrap(), None);
    }

    #[test]
    fn save_and_reload_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonFileCheckpointStore::open(&path).unwrap();
        store.save("am", &Seq::new("1042")).unwrap();
        store.save("owm", &Seq::new("88-g1AAAA")).unwrap();
        store.save("am", &Seq::new("1050")).unwrap();

        // A fresh open sees the latest durable state.
        let reopened = JsonFileCheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.load("am").unwrap(), Some(Seq::new("1050")));
        assert_eq!(reopened.load("owm").unwrap(), Some(Seq::new("88-g1AAAA")));
        assert_eq!(reopened.load("other").unwrap(), None);
    }

    #[test]
    fn state_file_holds_checkpoint_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonFileCheckpointStore::open(&path).unwrap();
        store.save("am", &Seq::new("1042")).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let records: Vec<Checkpoint> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(records, vec![Checkpoint::new("am", Seq::new("1042"))]);
    }

    #[test]
    fn no_stray_temp_file_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = JsonFileCheckpointStore::open(&path).unwrap();
        store.save("am", &Seq::new("7")).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = JsonFileCheckpointStore::open(&path).unwrap_err();
        assert!(matches!(err, SyncError::CheckpointPersist { .. }));
    }

    #[test]
    fn unwritable_directory_fails_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::open(dir.path().join("state.json")).unwrap();
        drop(dir); // directory removed out from under the store

        let err = store.save("am", &Seq::new("1")).unwrap_err();
        assert!(matches!(err, SyncError::CheckpointPersist { .. }));
    }
}
