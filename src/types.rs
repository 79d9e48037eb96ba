//! Core data types used throughout the datum codec
//!
//! This module defines the small shared enums used across the system:
//!
//! # Key Types
//!
//! - **`ObjectKind`**: What a stream measures (a device node or a location)
//! - **`AggregationLevel`**: Time bucket size for aggregate datum
//! - **`ReadingType`**: How an interval reading is derived
//! - **`CombiningType`**: How virtual streams combine real ones

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of object a stream belongs to
///
/// A stream measures either a device node or a location. The kind decides
/// which identity column a CSV payload uses (`nodeId` vs `locationId`) and
/// which id list a normalized criteria populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A device node
    Node,
    /// A physical location
    Location,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Node => write!(f, "node"),
            ObjectKind::Location => write!(f, "location"),
        }
    }
}

/// Time bucket size for aggregate datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AggregationLevel {
    /// No aggregation (raw datum)
    #[default]
    None,
    /// One minute buckets
    Minute,
    /// Five minute buckets
    FiveMinute,
    /// Fifteen minute buckets
    FifteenMinute,
    /// One hour buckets
    Hour,
    /// One day buckets
    Day,
    /// One month buckets
    Month,
    /// One year buckets
    Year,
    /// A single running total over the whole query range
    RunningTotal,
}

impl AggregationLevel {
    /// Short key used in wire formats and query parameters
    pub fn key(&self) -> &'static str {
        match self {
            AggregationLevel::None => "0",
            AggregationLevel::Minute => "m",
            AggregationLevel::FiveMinute => "5m",
            AggregationLevel::FifteenMinute => "15m",
            AggregationLevel::Hour => "h",
            AggregationLevel::Day => "d",
            AggregationLevel::Month => "M",
            AggregationLevel::Year => "y",
            AggregationLevel::RunningTotal => "rt",
        }
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// How an interval "reading" datum is derived from raw accumulating values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingType {
    /// Difference between readings at the exact range boundaries
    Difference,
    /// Difference between the readings nearest the range boundaries
    NearestDifference,
    /// The reading value calculated at a specific instant
    CalculatedAt,
    /// Difference between two calculated-at readings
    CalculatedAtDifference,
}

/// How a virtual combined stream merges its real source streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombiningType {
    /// Average the source values
    Average,
    /// Sum the source values
    Sum,
    /// Subtract subsequent sources from the first
    Difference,
}
