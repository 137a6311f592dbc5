//! Incremental document synchronization from heterogeneous CouchDB sources
//! into a unified LibreMap router database.
//!
//! The engine pulls change feeds from configured sources, transforms native
//! documents into the unified router schema, reconciles revisions against
//! the target, writes in batches, and checkpoints its cursor per source —
//! so a restart resumes where the last completed cycle left off.
//!
//! Store access goes through the [`SourceStore`], [`TargetStore`] and
//! [`CheckpointStore`] traits; [`http::CouchStore`] implements the first
//! two over any [`http::HttpClient`], and in-memory fakes back the tests.
//!
//! ```
//! use lmsync_engine::{
//!     MemoryCheckpointStore, MemorySourceStore, MemoryTargetStore, SourceConfig, SourceKind,
//!     SyncConfig, SyncEngine, SyncMode, TargetStore,
//! };
//! use std::sync::Arc;
//!
//! let config = SyncConfig::new("http://couch:5984/libremap").with_source(SourceConfig::new(
//!     "am-main",
//!     "http://couch:5984/altermap",
//!     SourceKind::AlterMap,
//! ));
//!
//! let source = Arc::new(MemorySourceStore::new());
//! source.insert(
//!     "n1",
//!     serde_json::json!({
//!         "_id": "n1",
//!         "collection": "nodes",
//!         "name": "router-a",
//!         "coords": {"lat": 41.4, "lon": 2.2}
//!     }),
//! );
//!
//! let target = Arc::new(MemoryTargetStore::new());
//! let mut engine = SyncEngine::new(
//!     config,
//!     Arc::clone(&target) as Arc<dyn TargetStore>,
//!     Arc::new(MemoryCheckpointStore::new()),
//! );
//! engine.bind_source("am-main", source).unwrap();
//! engine.run(SyncMode::OneShot).unwrap();
//!
//! assert_eq!(target.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod reader;
pub mod reconcile;
pub mod store;
pub mod writer;

pub use adapter::{CrossReferenceResolver, SourceAdapter, TransformOutcome};
pub use checkpoint::JsonFileCheckpointStore;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{RetryConfig, SourceConfig, SourceKind, SyncConfig};
pub use engine::{CycleReport, EnginePhase, EngineStats, SyncEngine, SyncMode};
pub use error::{SyncError, SyncResult};
pub use http::{CouchStore, HttpClient, HttpResponse};
pub use reader::{ChangeFeedReader, FeedPage};
pub use reconcile::RevisionReconciler;
pub use store::{
    CheckpointStore, MemoryCheckpointStore, MemorySourceStore, MemoryTargetStore, SourceStore,
    TargetStore,
};
pub use writer::{TargetWriter, WriteReport};
