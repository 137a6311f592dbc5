//! Revision reconciliation: merging existing target state into a batch.

use crate::error::SyncResult;
use crate::store::TargetStore;
use lmsync_protocol::RouterDocument;
use std::collections::BTreeMap;

/// Merges existing target documents into candidate batches before writes.
///
/// The lookup is a single multi-get for the whole batch: one round trip,
/// and one consistent snapshot of the revisions the writes must present.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionReconciler;

impl RevisionReconciler {
    /// Reconciles a batch of candidates, keyed by target id, in place.
    ///
    /// For each id with an existing target match the candidate takes over
    /// the match's revision token and creation time; ids without a match
    /// stay creates. Returns the number of candidates that matched.
    pub fn reconcile(
        &self,
        target: &dyn TargetStore,
        batch: &mut BTreeMap<String, RouterDocument>,
    ) -> SyncResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = batch.keys().cloned().collect();
        let rows = target.multi_get(&ids)?;

        let mut matched = 0;
        for row in rows {
            let Some(existing) = row.doc else { continue };
            if let Some(candidate) = batch.get_mut(&row.id) {
                candidate.rev = existing.rev.clone();
                candidate.ctime = existing.ctime.clone();
                matched += 1;
            }
        }
        Ok(matched)
    }
}
