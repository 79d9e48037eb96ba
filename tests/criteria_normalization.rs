//! Criteria Normalization Test Suite
//!
//! Validates the documented precedence and tie-break rules when legacy
//! filter shapes normalize into canonical criteria.
//!
//! Run with: cargo test --test criteria_normalization
use chrono::{TimeZone, Utc};

use datum_codec::criteria::{
    normalize, BasicDatumFilter, CombinedDatumFilter, DatumCriteria, FilterSource,
    MetadataSearch, SortDescriptor,
};
use datum_codec::types::{AggregationLevel, ObjectKind, ReadingType};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// PRECEDENCE RULES
// ============================================================================

#[test]
fn test_tags_normalize_to_or_expression() {
    // tags=[x,y] must become (tag=x) OR (tag=y), replacing any prior
    // metadata search filter value
    let filter = BasicDatumFilter {
        tags: Some(strings(&["x", "y"])),
        metadata_search: Some(MetadataSearch::TagEquals("stale".to_string())),
        ..Default::default()
    };
    let criteria = normalize(&filter, None, None, None);
    assert_eq!(
        criteria.metadata_search.unwrap().to_string(),
        "(|(/t=x)(/t=y))"
    );
}

#[test]
fn test_metadata_search_survives_without_tags() {
    let filter = BasicDatumFilter {
        metadata_search: Some(MetadataSearch::TagEquals("keep".to_string())),
        ..Default::default()
    };
    let criteria = normalize(&filter, None, None, None);
    assert_eq!(criteria.metadata_search.unwrap().to_string(), "(/t=keep)");
}

#[test]
fn test_caller_pagination_overrides_filter() {
    let filter = BasicDatumFilter {
        sorts: Some(vec![SortDescriptor::ascending("created")]),
        offset: Some(100),
        max: Some(1000),
        ..Default::default()
    };
    let criteria = normalize(
        &filter,
        Some(vec![
            SortDescriptor::descending("created"),
            SortDescriptor::ascending("source"),
        ]),
        Some(0),
        Some(10),
    );
    assert_eq!(criteria.sorts.as_ref().unwrap().len(), 2);
    assert!(criteria.sorts.unwrap()[0].descending);
    assert_eq!(criteria.offset, Some(0));
    assert_eq!(criteria.max, Some(10));
}

#[test]
fn test_partial_caller_pagination_mixes_with_filter() {
    let filter = BasicDatumFilter {
        offset: Some(100),
        max: Some(1000),
        ..Default::default()
    };
    // caller supplies only max; offset falls back to the filter
    let criteria = normalize(&filter, None, None, Some(10));
    assert_eq!(criteria.offset, Some(100));
    assert_eq!(criteria.max, Some(10));
}

// ============================================================================
// COMBINED SHAPE
// ============================================================================

#[test]
fn test_combined_shape_populates_many_fields() {
    struct Combined(CombinedDatumFilter);
    impl FilterSource for Combined {
        fn combined(&self) -> Option<&CombinedDatumFilter> {
            Some(&self.0)
        }
    }

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let filter = Combined(CombinedDatumFilter {
        node_ids: Some(vec![1, 2]),
        source_ids: Some(strings(&["solar/1"])),
        start_date: Some(start),
        end_date: Some(end),
        aggregation: Some(AggregationLevel::Day),
        most_recent: true,
        ..Default::default()
    });

    let criteria = normalize(&filter, None, None, None);
    assert_eq!(criteria.object_kind, Some(ObjectKind::Node));
    assert_eq!(criteria.node_ids, Some(vec![1, 2]));
    assert_eq!(criteria.source_ids, Some(strings(&["solar/1"])));
    assert_eq!(criteria.start_date, Some(start));
    assert_eq!(criteria.end_date, Some(end));
    assert_eq!(criteria.aggregation, Some(AggregationLevel::Day));
    assert!(criteria.most_recent);
}

#[test]
fn test_combined_location_kind_never_sets_node_ids() {
    struct Combined(CombinedDatumFilter);
    impl FilterSource for Combined {
        fn combined(&self) -> Option<&CombinedDatumFilter> {
            Some(&self.0)
        }
    }

    let filter = Combined(CombinedDatumFilter {
        object_kind: Some(ObjectKind::Location),
        location_ids: Some(vec![42]),
        node_ids: Some(vec![1]),
        ..Default::default()
    });
    let criteria = normalize(&filter, None, None, None);
    assert_eq!(criteria.location_ids, Some(vec![42]));
    assert!(criteria.node_ids.is_none());
}

// ============================================================================
// DETERMINISM AND DERIVED COPIES
// ============================================================================

#[test]
fn test_same_input_yields_structurally_equal_criteria() {
    let filter = BasicDatumFilter {
        node_ids: Some(vec![5]),
        source_ids: Some(strings(&["gen/1", "gen/2"])),
        aggregation: Some(AggregationLevel::Hour),
        partial_aggregation: Some(AggregationLevel::Day),
        reading_type: Some(ReadingType::NearestDifference),
        tags: Some(strings(&["a"])),
        offset: Some(1),
        max: Some(2),
        ..Default::default()
    };
    let runs: Vec<DatumCriteria> = (0..3).map(|_| normalize(&filter, None, None, None)).collect();
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
    assert_eq!(runs[0].reading_type, Some(ReadingType::NearestDifference));
    assert_eq!(runs[0].partial_aggregation, Some(AggregationLevel::Day));
}

#[test]
fn test_without_dates_transform() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let filter = BasicDatumFilter {
        node_ids: Some(vec![1]),
        start_date: Some(start),
        ..Default::default()
    };
    let criteria = normalize(&filter, None, None, None);
    let stripped = criteria.without_dates();
    assert!(stripped.start_date.is_none());
    assert!(stripped.end_date.is_none());
    assert_eq!(stripped.node_ids, criteria.node_ids);
    assert_eq!(criteria.start_date, Some(start));
}

#[test]
fn test_empty_filter_yields_empty_criteria() {
    let criteria = normalize(&BasicDatumFilter::default(), None, None, None);
    assert_eq!(criteria, DatumCriteria::default());
}
