//! Change-feed cursors, events and request/response types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque change-feed position issued by a source store.
///
/// Sequence tokens are source-defined, totally ordered and monotonic within
/// a source. The engine never inspects them beyond equality; it only hands
/// them back to the store that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(String);

impl Seq {
    /// Creates a sequence token from a source-issued value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The earliest position: a feed read from here sees every change.
    pub fn zero() -> Self {
        Self("0".into())
    }

    /// Returns true if this is the earliest position.
    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Seq {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single event from a source's change stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Position of this change in the source's stream.
    pub seq: Seq,
    /// Native document id.
    pub id: String,
    /// The document body at this change, if the feed included it.
    pub doc: Option<serde_json::Value>,
    /// Whether the document was deleted at this change.
    pub deleted: bool,
}

impl ChangeEvent {
    /// Creates a change event carrying a document body.
    pub fn new(seq: Seq, id: impl Into<String>, doc: serde_json::Value) -> Self {
        Self {
            seq,
            id: id.into(),
            doc: Some(doc),
            deleted: false,
        }
    }

    /// Creates a deletion event.
    pub fn deletion(seq: Seq, id: impl Into<String>) -> Self {
        Self {
            seq,
            id: id.into(),
            doc: None,
            deleted: true,
        }
    }
}

/// Polling mode for a changes-feed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Return immediately with whatever is available (possibly nothing).
    Normal,
    /// Block until at least one change exists or the source's timeout
    /// elapses; a timeout yields an empty batch, not an error.
    Longpoll,
}

impl FeedMode {
    /// The `feed` query parameter value for this mode.
    pub fn as_param(&self) -> &'static str {
        match self {
            FeedMode::Normal => "normal",
            FeedMode::Longpoll => "longpoll",
        }
    }
}

/// A request for a page of changes since a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesRequest {
    /// Read changes strictly after this position.
    pub since: Seq,
    /// Whether to include document bodies in the results.
    pub include_docs: bool,
    /// Polling mode.
    pub feed: FeedMode,
    /// Maximum number of results, if bounded.
    pub limit: Option<u32>,
}

impl ChangesRequest {
    /// Creates a request for everything after `since` with document bodies.
    pub fn since(since: Seq, feed: FeedMode) -> Self {
        Self {
            since,
            include_docs: true,
            feed,
            limit: None,
        }
    }

    /// Bounds the number of results.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A page of changes plus the position to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesResponse {
    /// Events in stream order.
    pub results: Vec<ChangeEvent>,
    /// Position after the last returned event. Equals the request's `since`
    /// when the feed had nothing new.
    pub last_seq: Seq,
}

impl ChangesResponse {
    /// Creates a response.
    pub fn new(results: Vec<ChangeEvent>, last_seq: Seq) -> Self {
        Self { results, last_seq }
    }

    /// Creates an empty response that leaves the cursor where it was.
    pub fn empty(since: Seq) -> Self {
        Self {
            results: Vec::new(),
            last_seq: since,
        }
    }

    /// Returns true if the page carries no events.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A persisted cursor record, one per configured source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identifier of the source this cursor belongs to.
    pub source_id: String,
    /// The position up to which the source has been fully processed.
    pub seq: Seq,
}

impl Checkpoint {
    /// Creates a checkpoint record.
    pub fn new(source_id: impl Into<String>, seq: Seq) -> Self {
        Self {
            source_id: source_id.into(),
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_zero_is_default() {
        assert_eq!(Seq::default(), Seq::zero());
        assert!(Seq::zero().is_zero());
        assert!(!Seq::new("42-abc").is_zero());
    }

    #[test]
    fn seq_roundtrips_as_transparent_string() {
        let seq = Seq::new("17-g1AAAA");
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"17-g1AAAA\"");
        let back: Seq = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn feed_mode_params() {
        assert_eq!(FeedMode::Normal.as_param(), "normal");
        assert_eq!(FeedMode::Longpoll.as_param(), "longpoll");
    }

    #[test]
    fn change_event_constructors() {
        let ev = ChangeEvent::new(Seq::new("3"), "n1", serde_json::json!({"a": 1}));
        assert!(!ev.deleted);
        assert!(ev.doc.is_some());

        let del = ChangeEvent::deletion(Seq::new("4"), "n2");
        assert!(del.deleted);
        assert!(del.doc.is_none());
    }

    #[test]
    fn empty_response_keeps_cursor() {
        let since = Seq::new("9");
        let resp = ChangesResponse::empty(since.clone());
        assert!(resp.is_empty());
        assert_eq!(resp.last_seq, since);
    }

    #[test]
    fn checkpoint_record() {
        let cp = Checkpoint::new("altermap-main", Seq::new("102"));
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["source_id"], "altermap-main");
        assert_eq!(json["seq"], "102");
    }
}
