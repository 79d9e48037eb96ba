//! Stream metadata model and provider
//!
//! Every stream carries an immutable schema: identity (stream id, object
//! kind and id, source id, time zone) and three ordered name arrays that
//! define the positional layout of datum property values. Metadata is
//! constructed once by storage and handed to the codecs as a read-only
//! lookup; nothing in this crate mutates it.
//!
//! # Key Types
//!
//! - **`StreamMetadata`**: one stream's schema
//! - **`MetadataProvider`**: lookup capability injected into codecs
//! - **`StaticMetadataProvider`**: immutable list-backed implementation

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::ObjectKind;

// ============================================================================
// Stream Metadata
// ============================================================================

/// Immutable per-stream schema
///
/// The length of each name array defines the valid positional index range
/// for the corresponding datum property array. Names within an array are
/// unique; [`StreamMetadata::new`] enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Unique stream identifier
    #[serde(rename = "streamId")]
    pub stream_id: Uuid,

    /// Whether the stream measures a node or a location
    pub kind: ObjectKind,

    /// Node or location id, per `kind`
    #[serde(rename = "objectId")]
    pub object_id: i64,

    /// Source identifier within the object
    #[serde(rename = "sourceId")]
    pub source_id: String,

    /// IANA time zone of the object
    #[serde(rename = "zone")]
    pub time_zone: String,

    /// Ordered instantaneous property names
    #[serde(rename = "i", default, skip_serializing_if = "Vec::is_empty")]
    pub instantaneous_names: Vec<String>,

    /// Ordered accumulating property names
    #[serde(rename = "a", default, skip_serializing_if = "Vec::is_empty")]
    pub accumulating_names: Vec<String>,

    /// Ordered status property names
    #[serde(rename = "s", default, skip_serializing_if = "Vec::is_empty")]
    pub status_names: Vec<String>,
}

impl StreamMetadata {
    /// Create stream metadata, validating name uniqueness within each array
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_id: Uuid,
        kind: ObjectKind,
        object_id: i64,
        source_id: impl Into<String>,
        time_zone: impl Into<String>,
        instantaneous_names: Vec<String>,
        accumulating_names: Vec<String>,
        status_names: Vec<String>,
    ) -> Result<Self> {
        for (label, names) in [
            ("instantaneous", &instantaneous_names),
            ("accumulating", &accumulating_names),
            ("status", &status_names),
        ] {
            let mut seen = std::collections::HashSet::with_capacity(names.len());
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(Error::configuration(format!(
                        "duplicate {} property name '{}'",
                        label, name
                    )));
                }
            }
        }
        Ok(Self {
            stream_id,
            kind,
            object_id,
            source_id: source_id.into(),
            time_zone: time_zone.into(),
            instantaneous_names,
            accumulating_names,
            status_names,
        })
    }

    /// Total number of named properties across all three types
    pub fn property_count(&self) -> usize {
        self.instantaneous_names.len() + self.accumulating_names.len() + self.status_names.len()
    }
}

// ============================================================================
// Metadata Provider
// ============================================================================

/// Read-only stream metadata lookup injected into encoders and decoders
///
/// Implementations must be safe to share across concurrent encode/decode
/// operations as long as they are not mutated during those operations.
pub trait MetadataProvider: Send + Sync {
    /// All stream ids this provider knows about, in declaration order
    ///
    /// The order is authoritative: encoders resolve their unified column
    /// schema by walking streams in exactly this order. `None` means the
    /// available streams are unknown.
    fn stream_ids(&self) -> Option<Vec<Uuid>>;

    /// Metadata for a stream id, or `None` when unknown
    fn metadata_for_stream(&self, stream_id: Uuid) -> Option<&StreamMetadata>;

    /// Metadata for an (object id, source id) pair, or `None` when unknown
    fn metadata_for_object_source(
        &self,
        object_id: i64,
        source_id: &str,
    ) -> Option<&StreamMetadata>;
}

impl<P: MetadataProvider + ?Sized> MetadataProvider for Arc<P> {
    fn stream_ids(&self) -> Option<Vec<Uuid>> {
        (**self).stream_ids()
    }

    fn metadata_for_stream(&self, stream_id: Uuid) -> Option<&StreamMetadata> {
        (**self).metadata_for_stream(stream_id)
    }

    fn metadata_for_object_source(
        &self,
        object_id: i64,
        source_id: &str,
    ) -> Option<&StreamMetadata> {
        (**self).metadata_for_object_source(object_id, source_id)
    }
}

/// Immutable list-backed metadata provider
///
/// Holds a fixed collection of [`StreamMetadata`] supplied at construction
/// and serves all three lookups from prebuilt indexes. Unknown lookups
/// return `None`, never an error.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    metadata: Vec<StreamMetadata>,
    by_stream: HashMap<Uuid, usize>,
    by_object_source: HashMap<(i64, String), usize>,
}

impl StaticMetadataProvider {
    /// Build a provider over a fixed metadata collection
    ///
    /// Declaration order of `metadata` is preserved by
    /// [`MetadataProvider::stream_ids`]. Later duplicates of a stream id or
    /// (object, source) key are ignored in favor of the first declaration.
    pub fn new(metadata: Vec<StreamMetadata>) -> Self {
        let mut by_stream = HashMap::with_capacity(metadata.len());
        let mut by_object_source = HashMap::with_capacity(metadata.len());
        for (i, meta) in metadata.iter().enumerate() {
            by_stream.entry(meta.stream_id).or_insert(i);
            by_object_source
                .entry((meta.object_id, meta.source_id.clone()))
                .or_insert(i);
        }
        Self {
            metadata,
            by_stream,
            by_object_source,
        }
    }

    /// Number of streams declared
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// True when no streams are declared
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// All declared metadata, in declaration order
    pub fn all(&self) -> &[StreamMetadata] {
        &self.metadata
    }
}

impl MetadataProvider for StaticMetadataProvider {
    fn stream_ids(&self) -> Option<Vec<Uuid>> {
        Some(self.metadata.iter().map(|m| m.stream_id).collect())
    }

    fn metadata_for_stream(&self, stream_id: Uuid) -> Option<&StreamMetadata> {
        self.by_stream.get(&stream_id).map(|&i| &self.metadata[i])
    }

    fn metadata_for_object_source(
        &self,
        object_id: i64,
        source_id: &str,
    ) -> Option<&StreamMetadata> {
        self.by_object_source
            .get(&(object_id, source_id.to_string()))
            .map(|&i| &self.metadata[i])
    }
}
