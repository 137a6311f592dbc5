//! # LibreMap Sync Protocol
//!
//! Data model and wire types for libremap-sync.
//!
//! This crate provides:
//! - Opaque change-feed cursors and change events
//! - Changes-feed request/response pairs
//! - Native source document variants (AlterMap, OpenWiFiMap)
//! - The unified LibreMap router document
//! - Multi-get and bulk-write result types
//! - Checkpoint records
//!
//! ## Key Invariants
//!
//! - Sequence tokens are opaque to the engine and totally ordered by the
//!   issuing source
//! - Target ids are deterministic, source-namespaced functions of native ids
//! - A router document's `ctime` is set once on creation and carried forward
//! - A write must present the current `_rev` to succeed, otherwise it
//!   conflicts

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod document;
mod messages;

pub use change_feed::{ChangeEvent, ChangesRequest, ChangesResponse, Checkpoint, FeedMode, Seq};
pub use document::{
    AlterMapDocument, Coordinates, OwmDocument, RouterDocument, SourceDocument, API_REV,
    ROUTER_TYPE,
};
pub use messages::{MultiGetRow, WriteResult, WriteStatus};
