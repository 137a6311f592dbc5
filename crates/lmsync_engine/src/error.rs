//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or timeout failure talking to a store. Retried with backoff
    /// in continuous mode; fatal in one-shot mode.
    #[error("transient fetch error talking to {store}: {message}")]
    TransientFetch {
        /// Which store the engine was talking to.
        store: String,
        /// Transport-reported detail.
        message: String,
    },

    /// A native document is missing fields the transform needs. The single
    /// document is skipped and counted; the batch proceeds.
    #[error("malformed {kind} document {id}: {reason}")]
    MalformedDocument {
        /// Source kind the document came from.
        kind: String,
        /// Native document id.
        id: String,
        /// What was missing or wrong.
        reason: String,
    },

    /// A write was rejected because the submitted revision is stale or
    /// missing. During a cycle conflicts are data, not errors — the writer
    /// reports them as [`lmsync_protocol::WriteStatus::Conflicted`] and the
    /// engine defers the document; this variant exists for callers that
    /// need to escalate a conflict themselves.
    #[error("revision conflict writing {0}")]
    RevisionConflict(String),

    /// The new cursor could not be durably recorded. Always fatal:
    /// proceeding would silently drop progress tracking.
    #[error("checkpoint persist failed for source {source_id}: {message}")]
    CheckpointPersist {
        /// Source whose cursor could not be saved.
        source_id: String,
        /// Underlying detail.
        message: String,
    },

    /// The engine was configured inconsistently.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a transient fetch error for the named store.
    pub fn transient(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientFetch {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-document error.
    pub fn malformed(
        kind: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedDocument {
            kind: kind.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a checkpoint persistence error.
    pub fn checkpoint(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointPersist {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error is a transient store failure that
    /// continuous mode retries after backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientFetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SyncError::transient("altermap-main", "connection refused").is_transient());
        assert!(!SyncError::checkpoint("altermap-main", "disk full").is_transient());
        assert!(!SyncError::malformed("altermap", "n1", "missing coords").is_transient());
        assert!(!SyncError::RevisionConflict("n2".into()).is_transient());
        assert!(!SyncError::Config("no sources".into()).is_transient());
    }

    #[test]
    fn error_display() {
        let err = SyncError::malformed("altermap", "n1", "missing coords");
        assert_eq!(err.to_string(), "malformed altermap document n1: missing coords");

        let err = SyncError::RevisionConflict("owm2libremap_w1".into());
        assert!(err.to_string().contains("owm2libremap_w1"));
    }
}
