//! CSV datum decoder
//!
//! The inverse of [`CsvDatumEncoder`](super::csv::CsvDatumEncoder): parses
//! a header row once, then lazily reconstructs one [`Datum`] per data row,
//! resolving each named column to the correct positional slot of the row's
//! own stream schema.
//!
//! The header must name exactly one date column (`created`, `ts` or
//! `date`, case-insensitive), one object-id column (`nodeId`, `node_id`,
//! `locationId` or `location_id`) and one source-id column (`sourceId` or
//! `source_id`); a header missing any of the three is a configuration
//! error raised before any data row is read.
//!
//! Rows whose (object id, source id) pair has no resolvable metadata are
//! skipped silently: CSV exported with stale or unknown streams still
//! ingests. Malformed decimals and timestamps are propagated as parse
//! failures, never substituted.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::datum::{Datum, Properties};
use crate::error::{Error, Result};
use crate::metadata::MetadataProvider;

const DATE_COLUMNS: &[&str] = &["created", "ts", "date"];
const OBJECT_COLUMNS: &[&str] = &["nodeid", "node_id", "locationid", "location_id"];
const SOURCE_COLUMNS: &[&str] = &["sourceid", "source_id"];

/// Lazy, single-pass CSV datum reader
///
/// Implements `Iterator<Item = Result<Datum>>`; exhaustion yields `None`.
/// Not restartable: the underlying reader is consumed as rows advance.
pub struct CsvDatumReader<R: BufRead> {
    reader: R,
    provider: Arc<dyn MetadataProvider>,
    date_column: usize,
    object_column: usize,
    source_column: usize,
    /// Remaining header columns as (field index, column name)
    property_columns: Vec<(usize, String)>,
}

impl<R: BufRead> CsvDatumReader<R> {
    /// Parse the header row and prepare to decode data rows
    pub fn new(mut reader: R, provider: Arc<dyn MetadataProvider>) -> Result<Self> {
        let header = read_record(&mut reader)?
            .ok_or_else(|| Error::configuration("empty CSV input; no header row"))?;

        let date_column = find_column(&header, DATE_COLUMNS)
            .ok_or_else(|| Error::configuration("header missing date column (created/ts/date)"))?;
        let object_column = find_column(&header, OBJECT_COLUMNS).ok_or_else(|| {
            Error::configuration("header missing object id column (nodeId/locationId)")
        })?;
        let source_column = find_column(&header, SOURCE_COLUMNS)
            .ok_or_else(|| Error::configuration("header missing source id column (sourceId)"))?;

        let property_columns = header
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_column && *i != object_column && *i != source_column)
            .map(|(i, name)| (i, name.clone()))
            .collect();

        Ok(Self {
            reader,
            provider,
            date_column,
            object_column,
            source_column,
            property_columns,
        })
    }

    /// Decode one data record into a datum, or `None` when its stream
    /// metadata cannot be resolved
    fn decode_record(&self, fields: &[String]) -> Result<Option<Datum>> {
        let object_raw = field(fields, self.object_column);
        let object_id = i64::from_str(object_raw)
            .map_err(|_| Error::malformed("objectId", object_raw))?;
        let source_id = field(fields, self.source_column);

        let Some(meta) = self
            .provider
            .metadata_for_object_source(object_id, source_id)
        else {
            debug!(object_id, source_id, "no metadata for row; skipping");
            return Ok(None);
        };

        let date_raw = field(fields, self.date_column);
        let timestamp = parse_instant(date_raw)?;

        let mut properties = Properties {
            instantaneous: vec![None; meta.instantaneous_names.len()],
            accumulating: vec![None; meta.accumulating_names.len()],
            status: vec![None; meta.status_names.len()],
            tags: Vec::new(),
        };

        for (index, name) in &self.property_columns {
            let raw = field(fields, *index);
            if raw.is_empty() {
                continue;
            }
            if let Some(pos) = position(&meta.instantaneous_names, name) {
                properties.instantaneous[pos] = Some(parse_decimal(name, raw)?);
            } else if let Some(pos) = position(&meta.accumulating_names, name) {
                properties.accumulating[pos] = Some(parse_decimal(name, raw)?);
            } else if let Some(pos) = position(&meta.status_names, name) {
                properties.status[pos] = Some(raw.to_string());
            } else if name == "tags" {
                properties.tags = raw
                    .split(',')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            // columns the row's metadata does not declare are ignored
        }

        Ok(Some(Datum::instant(meta.stream_id, timestamp, properties)))
    }
}

impl<R: BufRead> Iterator for CsvDatumReader<R> {
    type Item = Result<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match read_record(&mut self.reader) {
                Ok(Some(fields)) => fields,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            match self.decode_record(&record) {
                Ok(Some(datum)) => return Some(Ok(datum)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// ============================================================================
// Parsing Helpers
// ============================================================================

fn field(fields: &[String], index: usize) -> &str {
    fields.get(index).map(String::as_str).unwrap_or("")
}

fn find_column(header: &[String], accepted: &[&str]) -> Option<usize> {
    header.iter().position(|name| {
        accepted
            .iter()
            .any(|candidate| name.eq_ignore_ascii_case(candidate))
    })
}

fn position(names: &[String], name: &str) -> Option<usize> {
    names.iter().position(|n| n == name)
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|_| Error::malformed(column, raw))
}

/// Parse an ISO-8601 instant, accepting a space-separated local form as UTC
fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::malformed("ts", raw))
}

/// Read one logical CSV record, following quoted fields across line breaks
fn read_record<R: BufRead>(reader: &mut R) -> Result<Option<Vec<String>>> {
    let mut buf = String::new();
    loop {
        let read = reader.read_line(&mut buf)?;
        if read == 0 {
            if buf.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(parse_fields(buf.trim_end_matches(['\r', '\n']))));
        }
        // an odd number of quotes means a field is still open
        if buf.matches('"').count() % 2 != 0 {
            continue;
        }
        let record = buf.trim_end_matches(['\r', '\n']);
        if record.is_empty() {
            buf.clear();
            continue;
        }
        return Ok(Some(parse_fields(record)));
    }
}

/// Split one quote-balanced record into fields per standard CSV
fn parse_fields(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = record.chars().peekable();
    let mut in_quotes = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            }
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{StaticMetadataProvider, StreamMetadata};
    use crate::types::ObjectKind;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn meter_provider() -> (Uuid, Arc<dyn MetadataProvider>) {
        let meta = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            1,
            "meter/1",
            "UTC",
            names(&["watts"]),
            names(&["wattHours"]),
            names(&["state"]),
        )
        .unwrap();
        let id = meta.stream_id;
        (id, Arc::new(StaticMetadataProvider::new(vec![meta])))
    }

    #[test]
    fn test_decode_basic_rows() {
        let (id, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts,wattHours,state\n\
                   2024-01-01T00:00:00.000Z,1,meter/1,12.5,1000,on\n\
                   2024-01-01T00:01:00.000Z,1,meter/1,,1001,\n";
        let rows: Vec<Datum> = CsvDatumReader::new(csv.as_bytes(), provider)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stream_id, id);
        assert_eq!(rows[0].properties.instantaneous, vec![Some(dec!(12.5))]);
        assert_eq!(rows[0].properties.accumulating, vec![Some(dec!(1000))]);
        assert_eq!(rows[0].properties.status, vec![Some("on".to_string())]);
        assert_eq!(rows[1].properties.instantaneous, vec![None]);
        assert_eq!(rows[1].properties.status, vec![None]);
    }

    #[test]
    fn test_header_aliases_case_insensitive() {
        let (_, provider) = meter_provider();
        let csv = "Created,node_id,source_id,watts\n2024-01-01 00:00:00,1,meter/1,5\n";
        let rows: Vec<Datum> = CsvDatumReader::new(csv.as_bytes(), provider)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].properties.instantaneous, vec![Some(dec!(5))]);
    }

    #[test]
    fn test_missing_date_column_is_configuration_error() {
        let (_, provider) = meter_provider();
        let csv = "nodeId,sourceId,watts\n1,meter/1,5\n";
        assert!(matches!(
            CsvDatumReader::new(csv.as_bytes(), provider),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_source_column_is_configuration_error() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,watts\n2024-01-01T00:00:00Z,1,5\n";
        assert!(matches!(
            CsvDatumReader::new(csv.as_bytes(), provider),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_unresolvable_rows_are_skipped_silently() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts\n\
                   2024-01-01T00:00:00Z,99,unknown,5\n\
                   2024-01-01T00:01:00Z,1,meter/1,6\n";
        let rows: Vec<Datum> = CsvDatumReader::new(csv.as_bytes(), provider)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].properties.instantaneous, vec![Some(dec!(6))]);
    }

    #[test]
    fn test_malformed_decimal_propagates() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts\n2024-01-01T00:00:00Z,1,meter/1,abc\n";
        let result: Vec<Result<Datum>> =
            CsvDatumReader::new(csv.as_bytes(), provider).unwrap().collect();
        assert!(matches!(
            result[0],
            Err(Error::Malformed { ref column, .. }) if column == "watts"
        ));
    }

    #[test]
    fn test_malformed_timestamp_propagates() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts\nnot-a-date,1,meter/1,5\n";
        let result: Vec<Result<Datum>> =
            CsvDatumReader::new(csv.as_bytes(), provider).unwrap().collect();
        assert!(matches!(result[0], Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_undeclared_columns_are_ignored() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts,mystery\n2024-01-01T00:00:00Z,1,meter/1,5,42\n";
        let rows: Vec<Datum> = CsvDatumReader::new(csv.as_bytes(), provider)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].properties.instantaneous, vec![Some(dec!(5))]);
    }

    #[test]
    fn test_quoted_tags_field() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts,tags\n\
                   2024-01-01T00:00:00Z,1,meter/1,5,\"x,y\"\n";
        let rows: Vec<Datum> = CsvDatumReader::new(csv.as_bytes(), provider)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].properties.tags, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_parse_fields_quoting() {
        assert_eq!(parse_fields("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_fields("a,\"b,c\",d"), vec!["a", "b,c", "d"]);
        assert_eq!(parse_fields("\"he said \"\"hi\"\"\""), vec!["he said \"hi\""]);
        assert_eq!(parse_fields("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_exhausted_reader_yields_none() {
        let (_, provider) = meter_provider();
        let csv = "ts,nodeId,sourceId,watts\n2024-01-01T00:00:00Z,1,meter/1,5\n";
        let mut reader = CsvDatumReader::new(csv.as_bytes(), provider).unwrap();
        assert!(reader.next().is_some());
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }
}
