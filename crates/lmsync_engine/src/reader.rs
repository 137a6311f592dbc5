//! Change-feed reader: cursor-driven polling against a source store.

use crate::error::SyncResult;
use crate::store::SourceStore;
use lmsync_protocol::{ChangeEvent, ChangesRequest, FeedMode, Seq};

/// A page of change events plus the position to resume from.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// Events in stream order.
    pub events: Vec<ChangeEvent>,
    /// Cursor after this page; never behind the requested `since`.
    pub next_seq: Seq,
}

/// Drives polling against a source's change feed.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeedReader {
    limit: Option<u32>,
}

impl ChangeFeedReader {
    /// Creates a reader with no page bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of events per pull.
    pub fn with_limit(limit: u32) -> Self {
        Self { limit: Some(limit) }
    }

    /// Pulls a page of changes since `since`.
    ///
    /// In [`FeedMode::Normal`] the request returns immediately with whatever
    /// is available. In [`FeedMode::Longpoll`] the source may block until
    /// data exists or its timeout elapses; a timeout is an empty page, not
    /// an error. Transport failures surface as transient fetch errors.
    pub fn pull(
        &self,
        source: &dyn SourceStore,
        since: &Seq,
        mode: FeedMode,
    ) -> SyncResult<FeedPage> {
        let mut request = ChangesRequest::since(since.clone(), mode);
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }

        let response = source.changes(&request)?;
        // An empty page must leave the cursor exactly where it was.
        let next_seq = if response.is_empty() {
            since.clone()
        } else {
            response.last_seq
        };
        Ok(FeedPage {
            events: response.results,
            next_seq,
        })
    }
}
