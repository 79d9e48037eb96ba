//! Datum value model
//!
//! A datum is one time-stamped reading for a stream. Its property values are
//! stored in compact positional arrays aligned to the owning stream's
//! metadata name arrays: index *i* of [`Properties::instantaneous`]
//! corresponds to `instantaneous_names[i]` of the stream's
//! [`StreamMetadata`](crate::metadata::StreamMetadata).
//!
//! # Key Types
//!
//! - **`Properties`**: the four typed value arrays of a row
//! - **`Statistics`**: per-property aggregate statistics
//! - **`Datum`** / **`DatumKind`**: a row plus its closed variant
//!   discriminant (instant, aggregate, or interval reading)
//! - **`NamedSeries`**: validated pairing of a name array with a value array

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::AggregationLevel;

// ============================================================================
// Property Values
// ============================================================================

/// The typed value arrays of one datum row
///
/// Any array may be empty, meaning no values of that type are present for
/// the row. Each array must be no longer than the corresponding metadata
/// name array; [`NamedSeries`] enforces this at the codec boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Properties {
    /// Instantaneous sample values, positionally aligned to
    /// `instantaneous_names`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instantaneous: Vec<Option<Decimal>>,

    /// Accumulating meter values, positionally aligned to
    /// `accumulating_names`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accumulating: Vec<Option<Decimal>>,

    /// Status values, positionally aligned to `status_names`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<Option<String>>,

    /// Free-form tags attached to the row
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Properties {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no values of any type are present
    pub fn is_empty(&self) -> bool {
        self.instantaneous.iter().all(Option::is_none)
            && self.accumulating.iter().all(Option::is_none)
            && self.status.iter().all(Option::is_none)
            && self.tags.is_empty()
    }

    /// True when every status value is absent
    pub fn status_is_empty(&self) -> bool {
        self.status.iter().all(Option::is_none)
    }
}

// ============================================================================
// Aggregate Statistics
// ============================================================================

/// Statistics for one instantaneous property within an aggregate bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantaneousStatistics {
    /// Number of raw samples in the bucket
    pub count: u64,
    /// Minimum sampled value
    pub minimum: Decimal,
    /// Maximum sampled value
    pub maximum: Decimal,
}

/// Statistics for one accumulating property within an aggregate bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatingStatistics {
    /// Meter difference over the bucket
    pub difference: Decimal,
    /// Meter reading at the start of the bucket
    pub starting: Decimal,
    /// Meter reading at the end of the bucket
    pub ending: Decimal,
}

/// Per-property statistics of an aggregate datum
///
/// Positionally aligned the same way as [`Properties`]: index *i* of
/// `instantaneous` describes `instantaneous_names[i]`. Status properties
/// carry no statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Statistics {
    /// Count/min/max per instantaneous property
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instantaneous: Vec<Option<InstantaneousStatistics>>,

    /// Difference/start/end per accumulating property
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accumulating: Vec<Option<AccumulatingStatistics>>,
}

// ============================================================================
// Datum
// ============================================================================

/// Discriminant for the three datum shapes
///
/// A closed sum type: every codec branch over row kind is exhaustively
/// checked at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatumKind {
    /// A raw, instantaneous reading
    Instant,
    /// A time-bucket summary carrying statistics
    Aggregate {
        /// Per-property statistics for the bucket
        statistics: Statistics,
        /// Bucket size
        level: AggregationLevel,
    },
    /// An aggregate over an explicit start/end interval, e.g. a
    /// running-total difference reading
    Reading {
        /// Per-property statistics for the interval
        statistics: Statistics,
        /// Bucket size the interval was computed from
        level: AggregationLevel,
        /// End of the interval; the datum timestamp is the start
        end_timestamp: DateTime<Utc>,
    },
}

/// One time-stamped reading for a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum {
    /// The owning stream
    pub stream_id: Uuid,
    /// Timestamp of the reading (interval start for readings)
    pub timestamp: DateTime<Utc>,
    /// Property values, positionally aligned to the stream metadata
    pub properties: Properties,
    /// Row shape discriminant
    pub kind: DatumKind,
}

impl Datum {
    /// Create a raw instantaneous datum
    pub fn instant(stream_id: Uuid, timestamp: DateTime<Utc>, properties: Properties) -> Self {
        Self {
            stream_id,
            timestamp,
            properties,
            kind: DatumKind::Instant,
        }
    }

    /// Create an aggregate datum for a time bucket
    pub fn aggregate(
        stream_id: Uuid,
        timestamp: DateTime<Utc>,
        properties: Properties,
        statistics: Statistics,
        level: AggregationLevel,
    ) -> Self {
        Self {
            stream_id,
            timestamp,
            properties,
            kind: DatumKind::Aggregate { statistics, level },
        }
    }

    /// Create an interval reading datum
    pub fn reading(
        stream_id: Uuid,
        timestamp: DateTime<Utc>,
        end_timestamp: DateTime<Utc>,
        properties: Properties,
        statistics: Statistics,
        level: AggregationLevel,
    ) -> Self {
        Self {
            stream_id,
            timestamp,
            properties,
            kind: DatumKind::Reading {
                statistics,
                level,
                end_timestamp,
            },
        }
    }

    /// True for aggregate and reading datum
    pub fn is_aggregate(&self) -> bool {
        !matches!(self.kind, DatumKind::Instant)
    }

    /// The statistics of an aggregate or reading datum
    pub fn statistics(&self) -> Option<&Statistics> {
        match &self.kind {
            DatumKind::Instant => None,
            DatumKind::Aggregate { statistics, .. } => Some(statistics),
            DatumKind::Reading { statistics, .. } => Some(statistics),
        }
    }

    /// The aggregation level, if any
    pub fn aggregation_level(&self) -> Option<AggregationLevel> {
        match &self.kind {
            DatumKind::Instant => None,
            DatumKind::Aggregate { level, .. } => Some(*level),
            DatumKind::Reading { level, .. } => Some(*level),
        }
    }

    /// The interval end timestamp of a reading datum
    pub fn end_timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            DatumKind::Reading { end_timestamp, .. } => Some(*end_timestamp),
            _ => None,
        }
    }
}

// ============================================================================
// Named Series
// ============================================================================

/// A name array paired with a value array, validated at construction
///
/// Positional correlation between metadata names and datum values is easy
/// to get silently wrong; every codec walks values through this type
/// instead of zipping raw slices. The value slice may be shorter than the
/// name slice (trailing values absent) but never longer.
#[derive(Debug, Clone, Copy)]
pub struct NamedSeries<'a, T> {
    names: &'a [String],
    values: &'a [Option<T>],
}

impl<'a, T> NamedSeries<'a, T> {
    /// Pair a name slice with a value slice
    ///
    /// Returns [`Error::InvalidSeries`] when the value slice is longer than
    /// the name slice.
    pub fn new(names: &'a [String], values: &'a [Option<T>]) -> Result<Self> {
        if values.len() > names.len() {
            return Err(Error::InvalidSeries(format!(
                "{} values for {} names",
                values.len(),
                names.len()
            )));
        }
        Ok(Self { names, values })
    }

    /// Iterate `(name, value)` pairs over the full name range
    ///
    /// Positions past the end of the value slice yield `None` values.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a T>)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.values.get(i).and_then(Option::as_ref)))
    }

    /// Number of named positions
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when there are no named positions
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_named_series_rejects_oversized_values() {
        let n = names(&["a"]);
        let v = vec![Some(dec!(1)), Some(dec!(2))];
        assert!(NamedSeries::new(&n, &v).is_err());
    }

    #[test]
    fn test_named_series_pads_missing_values() {
        let n = names(&["a", "b", "c"]);
        let v = vec![Some(dec!(1.5))];
        let series = NamedSeries::new(&n, &v).unwrap();
        let pairs: Vec<_> = series.iter().collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("a", Some(&dec!(1.5))));
        assert_eq!(pairs[1], ("b", None));
        assert_eq!(pairs[2], ("c", None));
    }

    #[test]
    fn test_datum_kind_accessors() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let id = Uuid::new_v4();

        let instant = Datum::instant(id, ts, Properties::new());
        assert!(!instant.is_aggregate());
        assert!(instant.statistics().is_none());
        assert!(instant.end_timestamp().is_none());

        let agg = Datum::aggregate(
            id,
            ts,
            Properties::new(),
            Statistics::default(),
            AggregationLevel::Hour,
        );
        assert!(agg.is_aggregate());
        assert_eq!(agg.aggregation_level(), Some(AggregationLevel::Hour));
        assert!(agg.end_timestamp().is_none());

        let reading = Datum::reading(
            id,
            ts,
            end,
            Properties::new(),
            Statistics::default(),
            AggregationLevel::Day,
        );
        assert_eq!(reading.end_timestamp(), Some(end));
    }

    #[test]
    fn test_properties_emptiness() {
        let mut props = Properties::new();
        assert!(props.is_empty());
        props.status = vec![None, None];
        assert!(props.is_empty());
        assert!(props.status_is_empty());
        props.status[1] = Some("on".to_string());
        assert!(!props.is_empty());
        assert!(!props.status_is_empty());
    }
}
