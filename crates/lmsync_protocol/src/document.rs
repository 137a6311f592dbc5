//! Native source documents and the unified router document.

use serde::{Deserialize, Serialize};

/// The LibreMap API revision written into every router document.
pub const API_REV: &str = "1.0";

/// The target entity type. Only node/router documents are replicated.
pub const ROUTER_TYPE: &str = "router";

/// A native document from one of the supported sources.
///
/// Each source's schema is an explicit tagged variant; the transform
/// dispatches on the tag instead of probing for field presence.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDocument {
    /// An AlterMap document.
    AlterMap(AlterMapDocument),
    /// An OpenWiFiMap document.
    OpenWifiMap(OwmDocument),
}

/// Geographic coordinates as AlterMap stores them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

/// An AlterMap native document.
///
/// Only documents with `collection == "nodes"` describe routers; everything
/// else is filtered out upstream. Fields the transform requires are optional
/// here so that parsing never fails; the transform reports what is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterMapDocument {
    /// Native document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Collection tag; routers live in `"nodes"`.
    #[serde(default)]
    pub collection: Option<String>,
    /// Node name, mapped to the target hostname.
    #[serde(default)]
    pub name: Option<String>,
    /// Node position.
    #[serde(default)]
    pub coords: Option<Coordinates>,
    /// Reference to the network/community this node belongs to.
    #[serde(default)]
    pub network_id: Option<String>,
}

impl AlterMapDocument {
    /// Returns true if this document describes a node.
    pub fn is_node(&self) -> bool {
        self.collection.as_deref() == Some("nodes")
    }
}

/// An OpenWiFiMap native document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwmDocument {
    /// Native document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Entity type tag; routers carry `"node"`.
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    /// Hostname, carried over verbatim.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Latitude in decimal degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Height above ground in meters, mapped to the target elevation.
    #[serde(default)]
    pub height: Option<f64>,
    /// Source-side creation time, carried over when present.
    #[serde(default)]
    pub ctime: Option<String>,
    /// Source-side modification time, carried over when present.
    #[serde(default)]
    pub mtime: Option<String>,
}

impl OwmDocument {
    /// Returns true if this document describes a node.
    pub fn is_node(&self) -> bool {
        self.doc_type.as_deref() == Some("node")
    }
}

/// A router document in the unified LibreMap schema.
///
/// This is the only document shape ever written to the target store. The
/// field set is a closed, enumerated mapping from the source schemas;
/// unmapped source fields are dropped deliberately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDocument {
    /// Target id: the source's configured prefix plus the native id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Revision token of the existing target document, if any. A write
    /// without the current token is rejected as a conflict.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// LibreMap API revision, always [`API_REV`].
    pub api_rev: String,
    /// Entity type, always [`ROUTER_TYPE`].
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Router hostname.
    pub hostname: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Elevation in meters, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elev: Option<f64>,
    /// Community/network name resolved from the source, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    /// Creation time; set once on first creation, never overwritten.
    pub ctime: String,
    /// Modification time; refreshed on every successful write.
    pub mtime: String,
}

impl RouterDocument {
    /// Creates a router document with the mandatory fields.
    pub fn new(
        id: impl Into<String>,
        hostname: impl Into<String>,
        lat: f64,
        lon: f64,
        ctime: impl Into<String>,
        mtime: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rev: None,
            api_rev: API_REV.into(),
            doc_type: ROUTER_TYPE.into(),
            hostname: hostname.into(),
            lat,
            lon,
            elev: None,
            community: None,
            ctime: ctime.into(),
            mtime: mtime.into(),
        }
    }

    /// Sets the elevation.
    pub fn with_elevation(mut self, elev: f64) -> Self {
        self.elev = Some(elev);
        self
    }

    /// Sets the community name.
    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    /// Returns true if this candidate has no existing target match and the
    /// write will create a new document.
    pub fn is_create(&self) -> bool {
        self.rev.is_none()
    }
}
