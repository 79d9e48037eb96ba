//! Unified cross-stream column schema resolution
//!
//! A result set may mix rows from many independently-schemed streams. The
//! self-describing formats (CSV and verbose JSON) need one column list for
//! the whole payload, so property names are deduplicated across streams:
//! the first stream to declare a name claims its column, and every later
//! stream that shares the name shares the column.
//!
//! Resolution walks the streams in the metadata provider's declared order
//! and is computed from declared metadata only, never from which rows
//! happen to arrive. Rows from a stream not yet seen therefore cannot
//! change previously-emitted column order.

use std::collections::HashMap;

use tracing::debug;

use crate::metadata::MetadataProvider;

/// Number of derived statistic columns per instantaneous property in
/// aggregate mode (`_count`, `_min`, `_max`)
pub const INSTANTANEOUS_STAT_COLUMNS: usize = 3;

/// Number of derived statistic columns per accumulating property in
/// aggregate mode (`_start`, `_end`)
pub const ACCUMULATING_STAT_COLUMNS: usize = 2;

/// Which derived statistic columns a claimed name reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedColumns {
    /// No derived columns (non-aggregate payloads and status properties)
    None,
    /// `_count`, `_min`, `_max` reserved after the base column
    Instantaneous,
    /// `_start`, `_end` reserved after the base column
    Accumulating,
}

/// One resolved property column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSlot {
    /// Index of the base column within the property column list
    pub index: usize,
    /// Derived columns reserved immediately after the base column
    pub derived: DerivedColumns,
}

/// The resolved property column list for one payload
///
/// Holds only the property columns; identity columns (`ts`, `streamId` and
/// so on) and the trailing `tags` column are owned by the encoders.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    columns: Vec<String>,
    index: HashMap<String, ColumnSlot>,
    aggregate: bool,
}

impl ColumnSchema {
    /// Resolve the unified column schema for every stream the provider
    /// declares
    ///
    /// Walks each stream's instantaneous names, then accumulating, then
    /// status, appending each previously-unseen name. In aggregate mode
    /// each instantaneous name reserves `_count`, `_min`, `_max` columns
    /// immediately after it and each accumulating name reserves `_start`,
    /// `_end`. Status names never carry derived columns, aggregated or
    /// not.
    pub fn resolve(provider: &dyn MetadataProvider, aggregate: bool) -> Self {
        let mut schema = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            aggregate,
        };

        let stream_ids = provider.stream_ids().unwrap_or_default();
        for stream_id in &stream_ids {
            let Some(meta) = provider.metadata_for_stream(*stream_id) else {
                continue;
            };
            for name in &meta.instantaneous_names {
                let derived = if aggregate {
                    DerivedColumns::Instantaneous
                } else {
                    DerivedColumns::None
                };
                if schema.claim(name, derived) && aggregate {
                    schema.columns.push(format!("{}_count", name));
                    schema.columns.push(format!("{}_min", name));
                    schema.columns.push(format!("{}_max", name));
                }
            }
            for name in &meta.accumulating_names {
                let derived = if aggregate {
                    DerivedColumns::Accumulating
                } else {
                    DerivedColumns::None
                };
                if schema.claim(name, derived) && aggregate {
                    schema.columns.push(format!("{}_start", name));
                    schema.columns.push(format!("{}_end", name));
                }
            }
            for name in &meta.status_names {
                schema.claim(name, DerivedColumns::None);
            }
        }

        debug!(
            streams = stream_ids.len(),
            columns = schema.columns.len(),
            aggregate,
            "resolved unified column schema"
        );
        schema
    }

    /// Claim a column for `name` unless already claimed; true when newly
    /// claimed
    fn claim(&mut self, name: &str, derived: DerivedColumns) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(
            name.to_string(),
            ColumnSlot {
                index: self.columns.len(),
                derived,
            },
        );
        self.columns.push(name.to_string());
        true
    }

    /// The ordered property column names, derived columns included
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The resolved slot for a property name, or `None` when the name was
    /// never declared by any stream
    pub fn slot_of(&self, name: &str) -> Option<ColumnSlot> {
        self.index.get(name).copied()
    }

    /// Index of a property's base column, or `None` when the name was
    /// never declared by any stream
    pub fn column_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|s| s.index)
    }

    /// Whether derived statistic columns were reserved
    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    /// Total number of property columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when no stream declared any property
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
