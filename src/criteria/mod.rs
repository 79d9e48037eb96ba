//! Canonical query criteria
//!
//! Storage queries for datum rows accept many historically-evolved filter
//! shapes. This module defines the single canonical [`DatumCriteria`]
//! structure those shapes normalize into (see [`normalize`]) along with
//! the sort and metadata-search value types it carries.
//!
//! Criteria values are built fresh per query request and never persisted.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{AggregationLevel, CombiningType, ObjectKind, ReadingType};

pub mod normalize;

pub use normalize::{normalize, BasicDatumFilter, CombinedDatumFilter, FilterSource};

// ============================================================================
// Sorting
// ============================================================================

/// One sort dimension of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Sort key, e.g. `created`, `node`, `source`
    pub key: String,
    /// Descending order when true
    #[serde(default)]
    pub descending: bool,
}

impl SortDescriptor {
    /// Ascending sort on a key
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: false,
        }
    }

    /// Descending sort on a key
    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: true,
        }
    }
}

// ============================================================================
// Metadata Search
// ============================================================================

/// A metadata search filter expression
///
/// Renders in the nested search-filter syntax, e.g.
/// `(|(/t=red)(/t=blue))` for "tag is red or tag is blue".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataSearch {
    /// A tag-equals predicate
    TagEquals(String),
    /// Logical AND of sub-expressions
    And(Vec<MetadataSearch>),
    /// Logical OR of sub-expressions
    Or(Vec<MetadataSearch>),
}

impl MetadataSearch {
    /// The OR of one tag-equals predicate per tag value
    pub fn any_tag<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut predicates: Vec<MetadataSearch> = tags
            .iter()
            .map(|t| MetadataSearch::TagEquals(t.as_ref().to_string()))
            .collect();
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            MetadataSearch::Or(predicates)
        }
    }
}

impl fmt::Display for MetadataSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSearch::TagEquals(tag) => write!(f, "(/t={})", tag),
            MetadataSearch::And(terms) => {
                write!(f, "(&")?;
                for term in terms {
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
            MetadataSearch::Or(terms) => {
                write!(f, "(|")?;
                for term in terms {
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Canonical Criteria
// ============================================================================

/// Canonical datum query criteria
///
/// The flat structure every legacy filter shape normalizes into. After
/// normalization exactly one of `node_ids`/`location_ids` holds values from
/// a given source record, selected by object kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatumCriteria {
    /// Object kind the id lists refer to
    pub object_kind: Option<ObjectKind>,
    /// Node ids to match
    pub node_ids: Option<Vec<i64>>,
    /// Location ids to match
    pub location_ids: Option<Vec<i64>>,
    /// Source ids to match
    pub source_ids: Option<Vec<String>>,
    /// Owning user ids to match
    pub user_ids: Option<Vec<i64>>,
    /// Security token ids to match
    pub token_ids: Option<Vec<String>>,
    /// Stream ids to match directly
    pub stream_ids: Option<Vec<Uuid>>,
    /// Absolute range start (inclusive)
    pub start_date: Option<DateTime<Utc>>,
    /// Absolute range end (exclusive)
    pub end_date: Option<DateTime<Utc>>,
    /// Local (zone-relative) range start
    pub local_start_date: Option<NaiveDateTime>,
    /// Local (zone-relative) range end
    pub local_end_date: Option<NaiveDateTime>,
    /// Aggregation level of the requested datum
    pub aggregation: Option<AggregationLevel>,
    /// Partial-bucket aggregation level at the range edges
    pub partial_aggregation: Option<AggregationLevel>,
    /// Interval reading derivation
    pub reading_type: Option<ReadingType>,
    /// Only the most recent datum per stream
    pub most_recent: bool,
    /// Result ordering
    pub sorts: Option<Vec<SortDescriptor>>,
    /// Result offset
    pub offset: Option<u64>,
    /// Maximum result count
    pub max: Option<u32>,
    /// Metadata search filter
    pub metadata_search: Option<MetadataSearch>,
    /// Property names to restrict to, any type
    pub property_names: Option<Vec<String>>,
    /// Instantaneous property names to restrict to
    pub instantaneous_property_names: Option<Vec<String>>,
    /// Accumulating property names to restrict to
    pub accumulating_property_names: Option<Vec<String>>,
    /// Status property names to restrict to
    pub status_property_names: Option<Vec<String>>,
    /// Virtual-stream combining directive
    pub combining_type: Option<CombiningType>,
    /// Object id mapping directives, e.g. `100=1,2,3`
    pub object_id_mappings: Option<Vec<String>>,
    /// Source id mapping directives, e.g. `GEN=solar/1,solar/2`
    pub source_id_mappings: Option<Vec<String>>,
}

impl DatumCriteria {
    /// Create empty criteria
    pub fn new() -> Self {
        Self::default()
    }

    /// A derived copy with `start_date` and `end_date` cleared
    ///
    /// Used for downstream queries that must ignore the absolute date
    /// range; the original criteria is left untouched.
    pub fn without_dates(&self) -> Self {
        let mut copy = self.clone();
        copy.start_date = None;
        copy.end_date = None;
        copy
    }

    /// The populated object id list per the object kind, defaulting to
    /// node ids
    pub fn object_ids(&self) -> Option<&[i64]> {
        match self.object_kind {
            Some(ObjectKind::Location) => self.location_ids.as_deref(),
            _ => self.node_ids.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metadata_search_rendering() {
        let filter = MetadataSearch::any_tag(&["x", "y"]);
        assert_eq!(filter.to_string(), "(|(/t=x)(/t=y))");

        let single = MetadataSearch::any_tag(&["only"]);
        assert_eq!(single.to_string(), "(/t=only)");

        let combined = MetadataSearch::And(vec![
            MetadataSearch::TagEquals("a".to_string()),
            MetadataSearch::Or(vec![
                MetadataSearch::TagEquals("b".to_string()),
                MetadataSearch::TagEquals("c".to_string()),
            ]),
        ]);
        assert_eq!(combined.to_string(), "(&(/t=a)(|(/t=b)(/t=c)))");
    }

    #[test]
    fn test_without_dates_is_a_copy() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let criteria = DatumCriteria {
            node_ids: Some(vec![1]),
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        };
        let stripped = criteria.without_dates();
        assert!(stripped.start_date.is_none());
        assert!(stripped.end_date.is_none());
        assert_eq!(stripped.node_ids, Some(vec![1]));
        // original untouched
        assert_eq!(criteria.start_date, Some(start));
        assert_eq!(criteria.end_date, Some(end));
    }

    #[test]
    fn test_object_ids_follow_kind() {
        let criteria = DatumCriteria {
            object_kind: Some(ObjectKind::Location),
            location_ids: Some(vec![7]),
            ..Default::default()
        };
        assert_eq!(criteria.object_ids(), Some(&[7i64][..]));

        let criteria = DatumCriteria {
            node_ids: Some(vec![3]),
            ..Default::default()
        };
        assert_eq!(criteria.object_ids(), Some(&[3i64][..]));
    }
}
