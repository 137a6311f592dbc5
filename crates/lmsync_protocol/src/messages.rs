//! Multi-get and bulk-write result types.

use crate::document::RouterDocument;

/// One row of a batched lookup against the target store.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiGetRow {
    /// The id that was requested.
    pub id: String,
    /// The existing document, or `None` when the id has no match.
    pub doc: Option<RouterDocument>,
}

impl MultiGetRow {
    /// Creates a row with an existing document.
    pub fn found(id: impl Into<String>, doc: RouterDocument) -> Self {
        Self {
            id: id.into(),
            doc: Some(doc),
        }
    }

    /// Creates a row for an id with no match.
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doc: None,
        }
    }
}

/// Per-document outcome of a batched upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Target id of the document this outcome belongs to.
    pub id: String,
    /// What the store did with the document.
    pub status: WriteStatus,
}

/// What the target store did with one submitted document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteStatus {
    /// The document was written; the store issued a new revision.
    Accepted {
        /// The revision token after the write.
        rev: String,
    },
    /// The write was rejected because the submitted revision is stale or
    /// missing. The document is left for the next sync cycle.
    Conflicted,
    /// The write failed for some other reason.
    Failed {
        /// Store-reported reason.
        reason: String,
    },
}

impl WriteResult {
    /// Creates an accepted outcome.
    pub fn accepted(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WriteStatus::Accepted { rev: rev.into() },
        }
    }

    /// Creates a conflicted outcome.
    pub fn conflicted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WriteStatus::Conflicted,
        }
    }

    /// Creates a failed outcome.
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WriteStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Returns true if the document was written.
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, WriteStatus::Accepted { .. })
    }

    /// Returns true if the write was rejected as a revision conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self.status, WriteStatus::Conflicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_get_rows() {
        let doc = RouterDocument::new("n1", "h", 0.0, 0.0, "t", "t");
        let found = MultiGetRow::found("n1", doc);
        assert!(found.doc.is_some());

        let missing = MultiGetRow::missing("n2");
        assert!(missing.doc.is_none());
        assert_eq!(missing.id, "n2");
    }

    #[test]
    fn write_result_classification() {
        let ok = WriteResult::accepted("n1", "2-abc");
        assert!(ok.is_accepted());
        assert!(!ok.is_conflict());

        let conflict = WriteResult::conflicted("n2");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_accepted());

        let failed = WriteResult::failed("n3", "forbidden");
        assert!(!failed.is_accepted());
        assert!(!failed.is_conflict());
        assert!(matches!(
            failed.status,
            WriteStatus::Failed { ref reason } if reason == "forbidden"
        ));
    }
}
