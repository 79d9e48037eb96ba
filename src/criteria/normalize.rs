//! Legacy filter normalization
//!
//! Query filters arrive in several historically-evolved shapes with
//! overlapping fields. [`normalize`] maps any of them into one canonical
//! [`DatumCriteria`] with fixed precedence rules:
//!
//! 1. A combined legacy shape, when present, populates many fields at once
//!    and is checked first.
//! 2. Every remaining capability is consulted in a fixed order; a value the
//!    combined path already set is never overwritten, but capabilities the
//!    combined path does not cover are still applied.
//! 3. A `tags` capability translates into a metadata search expression
//!    (the OR of one tag-equals predicate per value), replacing any prior
//!    metadata search filter.
//! 4. Caller-supplied sorts/offset/max take priority over filter-embedded
//!    values; the filter's own values are the fallback.
//!
//! The transform is pure and deterministic; the same input always yields a
//! structurally equal criteria.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::types::{AggregationLevel, CombiningType, ObjectKind, ReadingType};

use super::{DatumCriteria, MetadataSearch, SortDescriptor};

// ============================================================================
// Filter Capabilities
// ============================================================================

/// Abstract view over any legacy filter shape
///
/// Each method is one optional capability; shapes implement only the
/// accessors they actually carry and inherit `None` for the rest.
pub trait FilterSource {
    /// The combined legacy shape, populating many fields at once
    fn combined(&self) -> Option<&CombinedDatumFilter> {
        None
    }
    /// Object kind of the id lists
    fn object_kind(&self) -> Option<ObjectKind> {
        None
    }
    /// Node ids
    fn node_ids(&self) -> Option<&[i64]> {
        None
    }
    /// Location ids
    fn location_ids(&self) -> Option<&[i64]> {
        None
    }
    /// Source ids
    fn source_ids(&self) -> Option<&[String]> {
        None
    }
    /// Owning user ids
    fn user_ids(&self) -> Option<&[i64]> {
        None
    }
    /// Security token ids
    fn token_ids(&self) -> Option<&[String]> {
        None
    }
    /// Stream ids
    fn stream_ids(&self) -> Option<&[Uuid]> {
        None
    }
    /// Absolute range start
    fn start_date(&self) -> Option<DateTime<Utc>> {
        None
    }
    /// Absolute range end
    fn end_date(&self) -> Option<DateTime<Utc>> {
        None
    }
    /// Local range start
    fn local_start_date(&self) -> Option<NaiveDateTime> {
        None
    }
    /// Local range end
    fn local_end_date(&self) -> Option<NaiveDateTime> {
        None
    }
    /// Aggregation level
    fn aggregation(&self) -> Option<AggregationLevel> {
        None
    }
    /// Partial-bucket aggregation level
    fn partial_aggregation(&self) -> Option<AggregationLevel> {
        None
    }
    /// Interval reading derivation
    fn reading_type(&self) -> Option<ReadingType> {
        None
    }
    /// Most-recent-only flag
    fn most_recent(&self) -> Option<bool> {
        None
    }
    /// Metadata tag values
    fn tags(&self) -> Option<&[String]> {
        None
    }
    /// Metadata search filter
    fn metadata_search(&self) -> Option<&MetadataSearch> {
        None
    }
    /// Embedded sort list
    fn sorts(&self) -> Option<&[SortDescriptor]> {
        None
    }
    /// Embedded result offset
    fn offset(&self) -> Option<u64> {
        None
    }
    /// Embedded result maximum
    fn max(&self) -> Option<u32> {
        None
    }
    /// Property names of any type
    fn property_names(&self) -> Option<&[String]> {
        None
    }
    /// Instantaneous property names
    fn instantaneous_property_names(&self) -> Option<&[String]> {
        None
    }
    /// Accumulating property names
    fn accumulating_property_names(&self) -> Option<&[String]> {
        None
    }
    /// Status property names
    fn status_property_names(&self) -> Option<&[String]> {
        None
    }
    /// Virtual-stream combining directive
    fn combining_type(&self) -> Option<CombiningType> {
        None
    }
    /// Object id mapping directives
    fn object_id_mappings(&self) -> Option<&[String]> {
        None
    }
    /// Source id mapping directives
    fn source_id_mappings(&self) -> Option<&[String]> {
        None
    }
}

// ============================================================================
// Normalization
// ============================================================================

type Capability = fn(&dyn FilterSource, &mut DatumCriteria);

/// Per-capability extractors, applied in this order after the combined
/// check. Each sets only fields still unset.
const CAPABILITIES: &[Capability] = &[
    extract_object_ids,
    extract_source_ids,
    extract_user_scope,
    extract_stream_ids,
    extract_date_range,
    extract_local_date_range,
    extract_aggregation,
    extract_reading,
    extract_most_recent,
    extract_property_names,
    extract_combining,
    extract_metadata_search,
    extract_pagination,
];

/// Normalize any legacy filter shape into canonical criteria
///
/// `sorts`, `offset` and `max` are the caller's explicit parameters; when
/// supplied they take priority over values embedded in the filter.
pub fn normalize(
    filter: &dyn FilterSource,
    sorts: Option<Vec<SortDescriptor>>,
    offset: Option<u64>,
    max: Option<u32>,
) -> DatumCriteria {
    let mut criteria = DatumCriteria::new();

    // combined legacy shapes populate many fields at once and skip the
    // per-capability checks for the fields they cover
    if let Some(combined) = filter.combined() {
        combined.apply_to(&mut criteria);
    }

    for capability in CAPABILITIES {
        capability(filter, &mut criteria);
    }

    // tags override any metadata search already present
    if let Some(tags) = filter.tags() {
        if !tags.is_empty() {
            criteria.metadata_search = Some(MetadataSearch::any_tag(tags));
        }
    }

    // explicit caller parameters beat filter-embedded values
    if sorts.is_some() {
        criteria.sorts = sorts;
    }
    if offset.is_some() {
        criteria.offset = offset;
    }
    if max.is_some() {
        criteria.max = max;
    }

    criteria
}

fn extract_object_ids(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.object_kind.is_none() {
        criteria.object_kind = filter.object_kind();
    }
    // exactly one id list goes live per source record, selected by kind;
    // an unspecified kind follows whichever list the filter carries,
    // preferring node ids
    match filter.object_kind() {
        Some(ObjectKind::Location) => {
            if criteria.location_ids.is_none() {
                criteria.location_ids = filter.location_ids().map(<[i64]>::to_vec);
            }
        }
        Some(ObjectKind::Node) => {
            if criteria.node_ids.is_none() {
                criteria.node_ids = filter.node_ids().map(<[i64]>::to_vec);
            }
        }
        None => {
            if let Some(ids) = filter.node_ids() {
                if criteria.node_ids.is_none() {
                    criteria.node_ids = Some(ids.to_vec());
                    criteria.object_kind.get_or_insert(ObjectKind::Node);
                }
            } else if let Some(ids) = filter.location_ids() {
                if criteria.location_ids.is_none() {
                    criteria.location_ids = Some(ids.to_vec());
                    criteria.object_kind.get_or_insert(ObjectKind::Location);
                }
            }
        }
    }
}

fn extract_source_ids(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.source_ids.is_none() {
        criteria.source_ids = filter.source_ids().map(<[String]>::to_vec);
    }
}

fn extract_user_scope(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.user_ids.is_none() {
        criteria.user_ids = filter.user_ids().map(<[i64]>::to_vec);
    }
    if criteria.token_ids.is_none() {
        criteria.token_ids = filter.token_ids().map(<[String]>::to_vec);
    }
}

fn extract_stream_ids(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.stream_ids.is_none() {
        criteria.stream_ids = filter.stream_ids().map(<[Uuid]>::to_vec);
    }
}

fn extract_date_range(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.start_date.is_none() {
        criteria.start_date = filter.start_date();
    }
    if criteria.end_date.is_none() {
        criteria.end_date = filter.end_date();
    }
}

fn extract_local_date_range(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.local_start_date.is_none() {
        criteria.local_start_date = filter.local_start_date();
    }
    if criteria.local_end_date.is_none() {
        criteria.local_end_date = filter.local_end_date();
    }
}

fn extract_aggregation(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.aggregation.is_none() {
        criteria.aggregation = filter.aggregation();
    }
    if criteria.partial_aggregation.is_none() {
        criteria.partial_aggregation = filter.partial_aggregation();
    }
}

fn extract_reading(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.reading_type.is_none() {
        criteria.reading_type = filter.reading_type();
    }
}

fn extract_most_recent(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if !criteria.most_recent {
        criteria.most_recent = filter.most_recent().unwrap_or(false);
    }
}

fn extract_property_names(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.property_names.is_none() {
        criteria.property_names = filter.property_names().map(<[String]>::to_vec);
    }
    if criteria.instantaneous_property_names.is_none() {
        criteria.instantaneous_property_names =
            filter.instantaneous_property_names().map(<[String]>::to_vec);
    }
    if criteria.accumulating_property_names.is_none() {
        criteria.accumulating_property_names =
            filter.accumulating_property_names().map(<[String]>::to_vec);
    }
    if criteria.status_property_names.is_none() {
        criteria.status_property_names = filter.status_property_names().map(<[String]>::to_vec);
    }
}

fn extract_combining(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.combining_type.is_none() {
        criteria.combining_type = filter.combining_type();
    }
    if criteria.object_id_mappings.is_none() {
        criteria.object_id_mappings = filter.object_id_mappings().map(<[String]>::to_vec);
    }
    if criteria.source_id_mappings.is_none() {
        criteria.source_id_mappings = filter.source_id_mappings().map(<[String]>::to_vec);
    }
}

fn extract_metadata_search(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.metadata_search.is_none() {
        criteria.metadata_search = filter.metadata_search().cloned();
    }
}

fn extract_pagination(filter: &dyn FilterSource, criteria: &mut DatumCriteria) {
    if criteria.sorts.is_none() {
        criteria.sorts = filter.sorts().map(<[SortDescriptor]>::to_vec);
    }
    if criteria.offset.is_none() {
        criteria.offset = filter.offset();
    }
    if criteria.max.is_none() {
        criteria.max = filter.max();
    }
}

// ============================================================================
// Legacy Shapes
// ============================================================================

/// The combined legacy filter shape
///
/// An older API surface carried object scope, date range and aggregation
/// in one record. When present it is applied before the per-capability
/// checks; the fields it covers are final.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombinedDatumFilter {
    /// Object kind of the id list
    pub object_kind: Option<ObjectKind>,
    /// Node ids (kind `Node`, the default)
    pub node_ids: Option<Vec<i64>>,
    /// Location ids (kind `Location`)
    pub location_ids: Option<Vec<i64>>,
    /// Source ids
    pub source_ids: Option<Vec<String>>,
    /// Absolute range start
    pub start_date: Option<DateTime<Utc>>,
    /// Absolute range end
    pub end_date: Option<DateTime<Utc>>,
    /// Aggregation level
    pub aggregation: Option<AggregationLevel>,
    /// Most-recent-only flag
    pub most_recent: bool,
}

impl CombinedDatumFilter {
    /// Populate criteria fields this shape covers
    fn apply_to(&self, criteria: &mut DatumCriteria) {
        criteria.object_kind = self.object_kind;
        match self.object_kind {
            Some(ObjectKind::Location) => {
                criteria.location_ids = self.location_ids.clone();
            }
            Some(ObjectKind::Node) => {
                criteria.node_ids = self.node_ids.clone();
            }
            None => {
                if self.node_ids.is_some() {
                    criteria.node_ids = self.node_ids.clone();
                    criteria.object_kind = Some(ObjectKind::Node);
                } else if self.location_ids.is_some() {
                    criteria.location_ids = self.location_ids.clone();
                    criteria.object_kind = Some(ObjectKind::Location);
                }
            }
        }
        criteria.source_ids = self.source_ids.clone();
        criteria.start_date = self.start_date;
        criteria.end_date = self.end_date;
        criteria.aggregation = self.aggregation;
        criteria.most_recent = self.most_recent;
    }
}

/// A general legacy filter shape with one optional field per capability
///
/// Deserializable from the legacy camelCase JSON query parameters.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BasicDatumFilter {
    /// Object kind of the id lists
    pub object_kind: Option<ObjectKind>,
    /// Node ids
    pub node_ids: Option<Vec<i64>>,
    /// Location ids
    pub location_ids: Option<Vec<i64>>,
    /// Source ids
    pub source_ids: Option<Vec<String>>,
    /// Owning user ids
    pub user_ids: Option<Vec<i64>>,
    /// Security token ids
    pub token_ids: Option<Vec<String>>,
    /// Stream ids
    pub stream_ids: Option<Vec<Uuid>>,
    /// Absolute range start
    pub start_date: Option<DateTime<Utc>>,
    /// Absolute range end
    pub end_date: Option<DateTime<Utc>>,
    /// Local range start
    pub local_start_date: Option<NaiveDateTime>,
    /// Local range end
    pub local_end_date: Option<NaiveDateTime>,
    /// Aggregation level
    pub aggregation: Option<AggregationLevel>,
    /// Partial-bucket aggregation level
    pub partial_aggregation: Option<AggregationLevel>,
    /// Interval reading derivation
    pub reading_type: Option<ReadingType>,
    /// Most-recent-only flag
    pub most_recent: Option<bool>,
    /// Metadata tag values
    pub tags: Option<Vec<String>>,
    /// Metadata search filter
    pub metadata_search: Option<MetadataSearch>,
    /// Embedded sort list
    pub sorts: Option<Vec<SortDescriptor>>,
    /// Embedded result offset
    pub offset: Option<u64>,
    /// Embedded result maximum
    pub max: Option<u32>,
    /// Property names of any type
    pub property_names: Option<Vec<String>>,
    /// Instantaneous property names
    pub instantaneous_property_names: Option<Vec<String>>,
    /// Accumulating property names
    pub accumulating_property_names: Option<Vec<String>>,
    /// Status property names
    pub status_property_names: Option<Vec<String>>,
    /// Virtual-stream combining directive
    pub combining_type: Option<CombiningType>,
    /// Object id mapping directives
    pub object_id_mappings: Option<Vec<String>>,
    /// Source id mapping directives
    pub source_id_mappings: Option<Vec<String>>,
}

impl FilterSource for BasicDatumFilter {
    fn object_kind(&self) -> Option<ObjectKind> {
        self.object_kind
    }
    fn node_ids(&self) -> Option<&[i64]> {
        self.node_ids.as_deref()
    }
    fn location_ids(&self) -> Option<&[i64]> {
        self.location_ids.as_deref()
    }
    fn source_ids(&self) -> Option<&[String]> {
        self.source_ids.as_deref()
    }
    fn user_ids(&self) -> Option<&[i64]> {
        self.user_ids.as_deref()
    }
    fn token_ids(&self) -> Option<&[String]> {
        self.token_ids.as_deref()
    }
    fn stream_ids(&self) -> Option<&[Uuid]> {
        self.stream_ids.as_deref()
    }
    fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }
    fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }
    fn local_start_date(&self) -> Option<NaiveDateTime> {
        self.local_start_date
    }
    fn local_end_date(&self) -> Option<NaiveDateTime> {
        self.local_end_date
    }
    fn aggregation(&self) -> Option<AggregationLevel> {
        self.aggregation
    }
    fn partial_aggregation(&self) -> Option<AggregationLevel> {
        self.partial_aggregation
    }
    fn reading_type(&self) -> Option<ReadingType> {
        self.reading_type
    }
    fn most_recent(&self) -> Option<bool> {
        self.most_recent
    }
    fn tags(&self) -> Option<&[String]> {
        self.tags.as_deref()
    }
    fn metadata_search(&self) -> Option<&MetadataSearch> {
        self.metadata_search.as_ref()
    }
    fn sorts(&self) -> Option<&[SortDescriptor]> {
        self.sorts.as_deref()
    }
    fn offset(&self) -> Option<u64> {
        self.offset
    }
    fn max(&self) -> Option<u32> {
        self.max
    }
    fn property_names(&self) -> Option<&[String]> {
        self.property_names.as_deref()
    }
    fn instantaneous_property_names(&self) -> Option<&[String]> {
        self.instantaneous_property_names.as_deref()
    }
    fn accumulating_property_names(&self) -> Option<&[String]> {
        self.accumulating_property_names.as_deref()
    }
    fn status_property_names(&self) -> Option<&[String]> {
        self.status_property_names.as_deref()
    }
    fn combining_type(&self) -> Option<CombiningType> {
        self.combining_type
    }
    fn object_id_mappings(&self) -> Option<&[String]> {
        self.object_id_mappings.as_deref()
    }
    fn source_id_mappings(&self) -> Option<&[String]> {
        self.source_id_mappings.as_deref()
    }
}
