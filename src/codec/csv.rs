//! CSV result encoder
//!
//! Emits one header row followed by one data row per datum, using the
//! unified cross-stream column schema from
//! [`ColumnSchema`](super::columns::ColumnSchema). The header is written on
//! the first datum, once the row shape (instant vs. aggregate) is known:
//!
//! ```text
//! ts,streamId,objectId,sourceId,<property columns...>,tags
//! ts_start,ts_end,streamId,objectId,sourceId,<property columns...>,tags
//! ```
//!
//! Decimals are written in plain form, absent values as empty strings,
//! instants as ISO-8601 text, and the tag list comma-joined in the final
//! (quoted when needed) field.

use std::io::Write;
use std::sync::Arc;

use crate::datum::{Datum, DatumKind, NamedSeries};
use crate::error::{Error, Result};
use crate::metadata::MetadataProvider;

use super::columns::{ColumnSchema, DerivedColumns};
use super::{format_decimal, format_instant, Attributes, DatumEncoder, EncoderState};

/// Incremental CSV encoder over any [`Write`] sink
pub struct CsvDatumEncoder<W: Write> {
    writer: W,
    provider: Option<Arc<dyn MetadataProvider>>,
    schema: Option<ColumnSchema>,
    state: EncoderState,
}

impl<W: Write> CsvDatumEncoder<W> {
    /// Create an encoder writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            provider: None,
            schema: None,
            state: EncoderState::Created,
        }
    }

    /// Consume the encoder and return the underlying sink
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Resolve the schema and write the header row; keyed off the first
    /// datum's kind
    fn write_header(&mut self, provider: &Arc<dyn MetadataProvider>, first: &Datum) -> Result<()> {
        let aggregate = first.is_aggregate();
        let schema = ColumnSchema::resolve(provider.as_ref(), aggregate);

        let mut header: Vec<String> = Vec::with_capacity(schema.len() + 6);
        if aggregate {
            header.push("ts_start".to_string());
            header.push("ts_end".to_string());
        } else {
            header.push("ts".to_string());
        }
        header.push("streamId".to_string());
        header.push("objectId".to_string());
        header.push("sourceId".to_string());
        header.extend(schema.columns().iter().cloned());
        header.push("tags".to_string());

        write_record(&mut self.writer, &header)?;
        self.schema = Some(schema);
        Ok(())
    }

    fn write_row(&mut self, provider: &Arc<dyn MetadataProvider>, datum: &Datum) -> Result<()> {
        let meta = provider
            .metadata_for_stream(datum.stream_id)
            .ok_or(Error::UnknownStream(datum.stream_id))?
            .clone();
        let Some(schema) = self.schema.as_ref() else {
            return Err(Error::configuration("column schema not resolved"));
        };

        let mut cells = vec![String::new(); schema.len()];

        let instantaneous =
            NamedSeries::new(&meta.instantaneous_names, &datum.properties.instantaneous)?;
        for (i, (name, value)) in instantaneous.iter().enumerate() {
            let Some(slot) = schema.slot_of(name) else {
                continue;
            };
            if let Some(v) = value {
                cells[slot.index] = format_decimal(v);
            }
            if slot.derived == DerivedColumns::Instantaneous {
                if let Some(stats) = datum
                    .statistics()
                    .and_then(|s| s.instantaneous.get(i))
                    .and_then(Option::as_ref)
                {
                    cells[slot.index + 1] = stats.count.to_string();
                    cells[slot.index + 2] = format_decimal(&stats.minimum);
                    cells[slot.index + 3] = format_decimal(&stats.maximum);
                }
            }
        }

        let accumulating =
            NamedSeries::new(&meta.accumulating_names, &datum.properties.accumulating)?;
        for (i, (name, value)) in accumulating.iter().enumerate() {
            let Some(slot) = schema.slot_of(name) else {
                continue;
            };
            if let Some(v) = value {
                cells[slot.index] = format_decimal(v);
            }
            if slot.derived == DerivedColumns::Accumulating {
                if let Some(stats) = datum
                    .statistics()
                    .and_then(|s| s.accumulating.get(i))
                    .and_then(Option::as_ref)
                {
                    cells[slot.index + 1] = format_decimal(&stats.starting);
                    cells[slot.index + 2] = format_decimal(&stats.ending);
                }
            }
        }

        let status = NamedSeries::new(&meta.status_names, &datum.properties.status)?;
        for (name, value) in status.iter() {
            let Some(slot) = schema.slot_of(name) else {
                continue;
            };
            if let Some(v) = value {
                cells[slot.index] = v.clone();
            }
        }

        let mut record: Vec<String> = Vec::with_capacity(cells.len() + 6);
        record.push(format_instant(datum.timestamp));
        if schema.is_aggregate() {
            record.push(match datum.kind {
                DatumKind::Reading { end_timestamp, .. } => format_instant(end_timestamp),
                _ => String::new(),
            });
        }
        record.push(datum.stream_id.to_string());
        record.push(meta.object_id.to_string());
        record.push(meta.source_id.clone());
        record.extend(cells);
        record.push(datum.properties.tags.join(","));

        write_record(&mut self.writer, &record)?;
        Ok(())
    }
}

impl<W: Write> DatumEncoder for CsvDatumEncoder<W> {
    fn start(
        &mut self,
        _total_results: Option<u64>,
        _starting_offset: Option<u64>,
        _expected_results: Option<u64>,
        attributes: &Attributes,
    ) -> Result<()> {
        self.state.expect_created()?;
        self.provider = Some(attributes.metadata_provider()?);
        self.state = EncoderState::Started;
        Ok(())
    }

    fn handle_result_item(&mut self, datum: &Datum) -> Result<()> {
        self.state.expect_started()?;
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| Error::configuration("encoder not started"))?;
        if self.schema.is_none() {
            self.write_header(&provider, datum)?;
        }
        self.write_row(&provider, datum)
    }

    fn flush(&mut self) -> Result<()> {
        if self.state == EncoderState::Closed {
            return Ok(());
        }
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == EncoderState::Closed {
            return Ok(());
        }
        // tolerate an already-closed sink
        let _ = self.writer.flush();
        self.state = EncoderState::Closed;
        Ok(())
    }
}

// ============================================================================
// CSV Record Writing
// ============================================================================

/// Write one CSV record with standard quoting
fn write_record<W: Write>(writer: &mut W, fields: &[String]) -> Result<()> {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        if needs_quoting(field) {
            line.push('"');
            for ch in field.chars() {
                if ch == '"' {
                    line.push('"');
                }
                line.push(ch);
            }
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push_str("\r\n");
    writer.write_all(line.as_bytes())?;
    Ok(())
}

fn needs_quoting(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{
        AccumulatingStatistics, InstantaneousStatistics, Properties, Statistics,
    };
    use crate::metadata::{StaticMetadataProvider, StreamMetadata};
    use crate::types::{AggregationLevel, ObjectKind};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn encode(provider: StaticMetadataProvider, rows: &[Datum]) -> String {
        let mut encoder = CsvDatumEncoder::new(Vec::new());
        let attrs = Attributes::with_provider(Arc::new(provider));
        encoder.start(None, None, None, &attrs).unwrap();
        for row in rows {
            encoder.handle_result_item(row).unwrap();
        }
        encoder.close().unwrap();
        String::from_utf8(encoder.into_inner()).unwrap()
    }

    #[test]
    fn test_multi_stream_header_dedup() {
        let m1 = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            1,
            "s1",
            "UTC",
            names(&["a", "b"]),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let m2 = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            2,
            "s2",
            "UTC",
            names(&["b", "c"]),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let id1 = m1.stream_id;
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let datum = Datum::instant(
            id1,
            ts,
            Properties {
                instantaneous: vec![Some(dec!(1.2)), Some(dec!(3))],
                ..Default::default()
            },
        );

        let out = encode(StaticMetadataProvider::new(vec![m1, m2]), &[datum]);
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "ts,streamId,objectId,sourceId,a,b,c,tags");
        let row = lines.next().unwrap();
        assert_eq!(
            row,
            format!("2024-01-01T00:00:00.000Z,{},1,s1,1.2,3,,", id1)
        );
    }

    #[test]
    fn test_aggregate_header_and_statistics() {
        let meta = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            1,
            "meter/1",
            "UTC",
            names(&["watts"]),
            names(&["wattHours"]),
            Vec::new(),
        )
        .unwrap();
        let id = meta.stream_id;
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let datum = Datum::reading(
            id,
            ts,
            end,
            Properties {
                instantaneous: vec![Some(dec!(100))],
                accumulating: vec![Some(dec!(25))],
                ..Default::default()
            },
            Statistics {
                instantaneous: vec![Some(InstantaneousStatistics {
                    count: 12,
                    minimum: dec!(90),
                    maximum: dec!(110),
                })],
                accumulating: vec![Some(AccumulatingStatistics {
                    difference: dec!(25),
                    starting: dec!(1000),
                    ending: dec!(1025),
                })],
            },
            AggregationLevel::Hour,
        );

        let out = encode(StaticMetadataProvider::new(vec![meta]), &[datum]);
        let mut lines = out.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ts_start,ts_end,streamId,objectId,sourceId,\
             watts,watts_count,watts_min,watts_max,\
             wattHours,wattHours_start,wattHours_end,tags"
        );
        let row = lines.next().unwrap();
        assert_eq!(
            row,
            format!(
                "2024-01-01T00:00:00.000Z,2024-01-01T01:00:00.000Z,{},1,meter/1,\
                 100,12,90,110,25,1000,1025,",
                id
            )
        );
    }

    #[test]
    fn test_tags_are_comma_joined_and_quoted() {
        let meta = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            1,
            "s",
            "UTC",
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let id = meta.stream_id;
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let datum = Datum::instant(
            id,
            ts,
            Properties {
                tags: vec!["x".to_string(), "y".to_string()],
                ..Default::default()
            },
        );

        let out = encode(StaticMetadataProvider::new(vec![meta]), &[datum]);
        let row = out.lines().nth(1).unwrap();
        assert!(row.ends_with(",\"x,y\""));
    }

    #[test]
    fn test_unknown_stream_is_fatal() {
        let meta = StreamMetadata::new(
            Uuid::new_v4(),
            ObjectKind::Node,
            1,
            "s",
            "UTC",
            names(&["a"]),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let provider = StaticMetadataProvider::new(vec![meta]);
        let mut encoder = CsvDatumEncoder::new(Vec::new());
        let attrs = Attributes::with_provider(Arc::new(provider));
        encoder.start(None, None, None, &attrs).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stray = Datum::instant(Uuid::new_v4(), ts, Properties::new());
        assert!(matches!(
            encoder.handle_result_item(&stray),
            Err(Error::UnknownStream(_))
        ));
    }

    #[test]
    fn test_missing_provider_fails_before_output() {
        let mut encoder = CsvDatumEncoder::new(Vec::new());
        let attrs = Attributes::new();
        assert!(matches!(
            encoder.start(None, None, None, &attrs),
            Err(Error::Configuration(_))
        ));
        assert!(encoder.into_inner().is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let provider = StaticMetadataProvider::new(Vec::new());
        let mut encoder = CsvDatumEncoder::new(Vec::new());
        let attrs = Attributes::with_provider(Arc::new(provider));
        encoder.start(None, None, None, &attrs).unwrap();
        encoder.close().unwrap();
        encoder.close().unwrap();
        assert!(encoder.into_inner().is_empty());
    }

    #[test]
    fn test_item_before_start_is_configuration_error() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let datum = Datum::instant(Uuid::new_v4(), ts, Properties::new());
        let mut encoder = CsvDatumEncoder::new(Vec::new());
        assert!(matches!(
            encoder.handle_result_item(&datum),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_quoting_rules() {
        let mut out = Vec::new();
        write_record(
            &mut out,
            &[
                "plain".to_string(),
                "has,comma".to_string(),
                "has\"quote".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "plain,\"has,comma\",\"has\"\"quote\"\r\n"
        );
    }
}
