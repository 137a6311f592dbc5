//! Target writer: batched upsert with per-document outcomes.

use crate::error::SyncResult;
use crate::store::TargetStore;
use lmsync_protocol::{RouterDocument, WriteResult, WriteStatus};

/// Per-document outcomes of one batched write.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// One result per submitted document.
    pub results: Vec<WriteResult>,
}

impl WriteReport {
    /// Number of accepted documents.
    pub fn accepted(&self) -> usize {
        self.results.iter().filter(|r| r.is_accepted()).count()
    }

    /// Number of revision conflicts.
    pub fn conflicted(&self) -> usize {
        self.results.iter().filter(|r| r.is_conflict()).count()
    }

    /// Number of failures that were neither accepted nor conflicts.
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, WriteStatus::Failed { .. }))
            .count()
    }

    /// Ids of the conflicted documents.
    pub fn conflicted_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_conflict())
            .map(|r| r.id.as_str())
            .collect()
    }
}

/// Performs batched upserts against the target store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetWriter;

impl TargetWriter {
    /// Writes a batch and reports per-document outcomes.
    ///
    /// A revision conflict on one document never aborts the rest; conflicted
    /// documents are deferred to the next cycle rather than force-written.
    pub fn write(
        &self,
        target: &dyn TargetStore,
        batch: &[RouterDocument],
    ) -> SyncResult<WriteReport> {
        if batch.is_empty() {
            return Ok(WriteReport::default());
        }

        let results = target.bulk_update(batch)?;
        for result in &results {
            match &result.status {
                WriteStatus::Accepted { rev } => {
                    tracing::debug!(id = %result.id, rev = %rev, "write accepted");
                }
                WriteStatus::Conflicted => {
                    tracing::warn!(id = %result.id, "revision conflict, deferring to next cycle");
                }
                WriteStatus::Failed { reason } => {
                    tracing::warn!(id = %result.id, reason = %reason, "write failed");
                }
            }
        }
        Ok(WriteReport { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTargetStore;

    fn candidate(id: &str) -> RouterDocument {
        RouterDocument::new(id, "host", 1.0, 2.0, "t", "t")
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let target = MemoryTargetStore::new();
        let report = TargetWriter.write(&target, &[]).unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.accepted(), 0);
    }

    #[test]
    fn conflict_does_not_abort_batch() {
        let target = MemoryTargetStore::new();
        target.inject_conflict("n2");

        let batch = vec![candidate("n1"), candidate("n2"), candidate("n3")];
        let report = TargetWriter.write(&target, &batch).unwrap();

        assert_eq!(report.accepted(), 2);
        assert_eq!(report.conflicted(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.conflicted_ids(), vec!["n2"]);
        assert!(target.get("n1").is_some());
        assert!(target.get("n2").is_none());
        assert!(target.get("n3").is_some());
    }

    #[test]
    fn transport_failure_propagates() {
        let target = MemoryTargetStore::new();
        target.set_failing(true);

        let err = TargetWriter.write(&target, &[candidate("n1")]).unwrap_err();
        assert!(err.is_transient());
    }
}
