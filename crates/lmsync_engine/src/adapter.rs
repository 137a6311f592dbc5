//! Source adapters: per-source transform and filter.
//!
//! Each adapter knows one native schema and converts a raw document into
//! the unified router schema, or signals that the document is not a router.
//! The field mapping is a closed table; native fields outside it are
//! dropped deliberately.

use crate::config::{SourceConfig, SourceKind};
use crate::error::{SyncError, SyncResult};
use crate::store::SourceStore;
use lmsync_protocol::{AlterMapDocument, OwmDocument, RouterDocument, SourceDocument};
use serde_json::Value;

/// Resolves auxiliary lookups against a source store.
///
/// Passed explicitly to transforms so that tests can substitute a stub
/// store; the resolver is a capability, not a hidden connection.
pub struct CrossReferenceResolver<'a> {
    source: &'a dyn SourceStore,
}

impl<'a> CrossReferenceResolver<'a> {
    /// Creates a resolver over the given source store.
    pub fn new(source: &'a dyn SourceStore) -> Self {
        Self { source }
    }

    /// Resolves a network reference to its community name.
    ///
    /// A missing network document, a network without a `name` attribute,
    /// and a lookup failure all resolve to "no value" — never an error.
    pub fn community_name(&self, network_id: &str) -> Option<String> {
        match self.source.get(network_id) {
            Ok(Some(network)) => network
                .get("name")
                .and_then(Value::as_str)
                .map(String::from),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(network_id, error = %e, "community lookup failed");
                None
            }
        }
    }
}

/// Outcome of a per-document transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// The document maps to a router candidate.
    Document(RouterDocument),
    /// The document does not describe a router; filtered out, not an error.
    Skip,
}

/// A per-source transform from native documents to router documents.
#[derive(Debug, Clone)]
pub struct SourceAdapter {
    kind: SourceKind,
    id_prefix: String,
}

impl SourceAdapter {
    /// Creates an adapter for a source kind with an explicit id prefix.
    pub fn new(kind: SourceKind, id_prefix: impl Into<String>) -> Self {
        Self {
            kind,
            id_prefix: id_prefix.into(),
        }
    }

    /// Creates the adapter a source configuration calls for.
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.kind, config.id_prefix())
    }

    /// The source kind this adapter handles.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Derives the target id for a native id: deterministic and namespaced
    /// so distinct sources never collide.
    pub fn target_id(&self, native_id: &str) -> String {
        format!("{}{}", self.id_prefix, native_id)
    }

    /// Parses a raw document into this adapter's native variant.
    pub fn parse(&self, raw: &Value) -> SyncResult<SourceDocument> {
        let malformed = |e: serde_json::Error| {
            let id = raw
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or("<no id>");
            SyncError::malformed(self.kind.name(), id, e.to_string())
        };
        match self.kind {
            SourceKind::AlterMap => serde_json::from_value::<AlterMapDocument>(raw.clone())
                .map(SourceDocument::AlterMap)
                .map_err(malformed),
            SourceKind::OpenWifiMap => serde_json::from_value::<OwmDocument>(raw.clone())
                .map(SourceDocument::OpenWifiMap)
                .map_err(malformed),
        }
    }

    /// Converts one native document into a router candidate.
    ///
    /// Returns [`TransformOutcome::Skip`] when the document's type tag does
    /// not denote a node/router, and `MalformedDocument` when a required
    /// field is missing.
    pub fn transform(
        &self,
        raw: &Value,
        resolver: &CrossReferenceResolver<'_>,
        now: &str,
    ) -> SyncResult<TransformOutcome> {
        match self.parse(raw)? {
            SourceDocument::AlterMap(doc) => self.from_altermap(doc, resolver, now),
            SourceDocument::OpenWifiMap(doc) => self.from_owm(doc, now),
        }
    }

    fn from_altermap(
        &self,
        doc: AlterMapDocument,
        resolver: &CrossReferenceResolver<'_>,
        now: &str,
    ) -> SyncResult<TransformOutcome> {
        if !doc.is_node() {
            return Ok(TransformOutcome::Skip);
        }

        let missing =
            |field: &str| SyncError::malformed(self.kind.name(), &doc.id, format!("missing {field}"));
        let name = doc.name.ok_or_else(|| missing("name"))?;
        let coords = doc.coords.ok_or_else(|| missing("coords"))?;

        let mut router = RouterDocument::new(
            self.target_id(&doc.id),
            name,
            coords.lat,
            coords.lon,
            now,
            now,
        );
        if let Some(network_id) = doc.network_id.as_deref() {
            if let Some(community) = resolver.community_name(network_id) {
                router.community = Some(community);
            }
        }
        Ok(TransformOutcome::Document(router))
    }

    fn from_owm(&self, doc: OwmDocument, now: &str) -> SyncResult<TransformOutcome> {
        if !doc.is_node() {
            return Ok(TransformOutcome::Skip);
        }

        let missing =
            |field: &str| SyncError::malformed(self.kind.name(), &doc.id, format!("missing {field}"));
        let hostname = doc.hostname.ok_or_else(|| missing("hostname"))?;
        let latitude = doc.latitude.ok_or_else(|| missing("latitude"))?;
        let longitude = doc.longitude.ok_or_else(|| missing("longitude"))?;

        let mut router = RouterDocument::new(
            self.target_id(&doc.id),
            hostname,
            latitude,
            longitude,
            doc.ctime.unwrap_or_else(|| now.to_string()),
            doc.mtime.unwrap_or_else(|| now.to_string()),
        );
        router.elev = doc.height;
        Ok(TransformOutcome::Document(router))
    }
}
