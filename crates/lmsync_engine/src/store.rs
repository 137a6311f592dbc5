//! Store abstractions and in-memory implementations.
//!
//! The engine talks to document stores only through these traits, so cycles
//! run against real CouchDB instances and in-memory fakes alike.

use crate::error::{SyncError, SyncResult};
use lmsync_protocol::{
    ChangeEvent, ChangesRequest, ChangesResponse, MultiGetRow, RouterDocument, Seq, WriteResult,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Read access to a source document store.
pub trait SourceStore: Send + Sync {
    /// Pulls a page of changes.
    ///
    /// Long-poll requests block until data exists or the source's timeout
    /// elapses; a timeout yields an empty page with an unchanged cursor.
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse>;

    /// Point lookup of a raw document by native id. Absence is `None`.
    fn get(&self, id: &str) -> SyncResult<Option<serde_json::Value>>;
}

/// Write access to the unified target store.
pub trait TargetStore: Send + Sync {
    /// Batched lookup of existing router documents, one row per requested
    /// id, in request order.
    fn multi_get(&self, ids: &[String]) -> SyncResult<Vec<MultiGetRow>>;

    /// Batched upsert. Returns one outcome per submitted document; a
    /// conflict for one document never aborts the rest.
    fn bulk_update(&self, docs: &[RouterDocument]) -> SyncResult<Vec<WriteResult>>;
}

/// Durable cursor storage, one record per source.
pub trait CheckpointStore: Send + Sync {
    /// Reads the persisted cursor for a source, if any.
    fn load(&self, source_id: &str) -> SyncResult<Option<Seq>>;

    /// Durably records the cursor for a source.
    fn save(&self, source_id: &str, seq: &Seq) -> SyncResult<()>;
}

#[derive(Debug, Clone)]
struct StoredChange {
    seq: u64,
    id: String,
    doc: Option<serde_json::Value>,
    deleted: bool,
}

/// An in-memory source store for tests.
///
/// Issues numeric sequence tokens and serves a CouchDB-shaped change feed:
/// one entry per document, at its latest change. Long-poll requests return
/// immediately.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    changes: RwLock<Vec<StoredChange>>,
    docs: RwLock<HashMap<String, serde_json::Value>>,
    next_seq: AtomicU64,
    failing: AtomicBool,
}

impl MemorySourceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            changes: RwLock::new(Vec::new()),
            docs: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Inserts or updates a document, recording a change event.
    pub fn insert(&self, id: impl Into<String>, doc: serde_json::Value) -> Seq {
        let id = id.into();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.docs.write().insert(id.clone(), doc.clone());
        self.changes.write().push(StoredChange {
            seq,
            id,
            doc: Some(doc),
            deleted: false,
        });
        Seq::new(seq.to_string())
    }

    /// Deletes a document, recording a deletion event.
    pub fn delete(&self, id: impl Into<String>) -> Seq {
        let id = id.into();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.docs.write().remove(&id);
        self.changes.write().push(StoredChange {
            seq,
            id,
            doc: None,
            deleted: true,
        });
        Seq::new(seq.to_string())
    }

    /// Makes every subsequent request fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::transient("memory-source", "injected failure"))
        } else {
            Ok(())
        }
    }
}

impl SourceStore for MemorySourceStore {
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        self.check_available()?;

        let since: u64 = request.since.as_str().parse().unwrap_or(0);
        let changes = self.changes.read();

        // Latest change per document, CouchDB style.
        let mut latest: BTreeMap<u64, &StoredChange> = BTreeMap::new();
        let mut seen: HashMap<&str, u64> = HashMap::new();
        for change in changes.iter().filter(|c| c.seq > since) {
            if let Some(prev) = seen.insert(change.id.as_str(), change.seq) {
                latest.remove(&prev);
            }
            latest.insert(change.seq, change);
        }

        let mut results: Vec<ChangeEvent> = Vec::new();
        for change in latest.values() {
            if let Some(limit) = request.limit {
                if results.len() as u32 >= limit {
                    break;
                }
            }
            let seq = Seq::new(change.seq.to_string());
            results.push(if change.deleted {
                ChangeEvent::deletion(seq, change.id.clone())
            } else {
                let doc = if request.include_docs {
                    change.doc.clone()
                } else {
                    None
                };
                ChangeEvent {
                    seq,
                    id: change.id.clone(),
                    doc,
                    deleted: false,
                }
            });
        }

        let last_seq = results
            .last()
            .map(|e| e.seq.clone())
            .unwrap_or_else(|| request.since.clone());
        Ok(ChangesResponse::new(results, last_seq))
    }

    fn get(&self, id: &str) -> SyncResult<Option<serde_json::Value>> {
        self.check_available()?;
        Ok(self.docs.read().get(id).cloned())
    }
}

/// An in-memory target store for tests.
///
/// Enforces revision checks the way CouchDB does: an update must present
/// the stored document's current revision or it conflicts.
#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    docs: RwLock<BTreeMap<String, RouterDocument>>,
    forced_conflicts: RwLock<HashSet<String>>,
    failing: AtomicBool,
}

impl MemoryTargetStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored document for an id, if any.
    pub fn get(&self, id: &str) -> Option<RouterDocument> {
        self.docs.read().get(id).cloned()
    }

    /// Returns all stored documents in id order.
    pub fn all(&self) -> Vec<RouterDocument> {
        self.docs.read().values().cloned().collect()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Forces the next write of `id` to report a revision conflict, as if
    /// another writer got there first.
    pub fn inject_conflict(&self, id: impl Into<String>) {
        self.forced_conflicts.write().insert(id.into());
    }

    /// Makes every subsequent request fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::transient("memory-target", "injected failure"))
        } else {
            Ok(())
        }
    }

    fn next_rev(current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|gen| gen.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-mem", generation + 1)
    }
}

impl TargetStore for MemoryTargetStore {
    fn multi_get(&self, ids: &[String]) -> SyncResult<Vec<MultiGetRow>> {
        self.check_available()?;
        let docs = self.docs.read();
        Ok(ids
            .iter()
            .map(|id| match docs.get(id) {
                Some(doc) => MultiGetRow::found(id.clone(), doc.clone()),
                None => MultiGetRow::missing(id.clone()),
            })
            .collect())
    }

    fn bulk_update(&self, docs: &[RouterDocument]) -> SyncResult<Vec<WriteResult>> {
        self.check_available()?;
        let mut stored = self.docs.write();
        let mut forced = self.forced_conflicts.write();

        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            if forced.remove(&doc.id) {
                results.push(WriteResult::conflicted(doc.id.clone()));
                continue;
            }

            let current_rev = stored.get(&doc.id).and_then(|d| d.rev.clone());
            if current_rev != doc.rev {
                results.push(WriteResult::conflicted(doc.id.clone()));
                continue;
            }

            let new_rev = Self::next_rev(current_rev.as_deref());
            let mut accepted = doc.clone();
            accepted.rev = Some(new_rev.clone());
            stored.insert(doc.id.clone(), accepted);
            results.push(WriteResult::accepted(doc.id.clone(), new_rev));
        }
        Ok(results)
    }
}

/// An in-memory checkpoint store for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: RwLock<HashMap<String, Seq>>,
    failing: AtomicBool,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, source_id: &str) -> SyncResult<Option<Seq>> {
        Ok(self.records.read().get(source_id).cloned())
    }

    fn save(&self, source_id: &str, seq: &Seq) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::checkpoint(source_id, "injected failure"));
        }
        self.records
            .write()
            .insert(source_id.to_string(), seq.clone());
        Ok(())
    }
}
