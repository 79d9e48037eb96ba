//! JSON result encoders
//!
//! Two encoders share the envelope shape
//! `{success?, returnedResultCount?, startingOffset?, totalResultCount?,
//! meta?, data: [...]}` with the count fields present only when the
//! corresponding `start` argument was supplied.
//!
//! [`CompactJsonEncoder`] writes positional rows against each stream's own
//! metadata (no cross-stream column dedup) and emits a `meta` array of
//! serialized [`StreamMetadata`](crate::metadata::StreamMetadata) once up
//! front; each row's first element indexes into it. Row shapes:
//!
//! ```text
//! instant:   [metaIndex, ts_ms, i..., a..., s..., tags...]
//! aggregate: [metaIndex, [ts_start_ms, ts_end_ms|null],
//!             [val,count,min,max]|null..., [val,start,end]|null...]
//! ```
//!
//! An instant row's status and tag tail is omitted when every status value
//! is null and no tags are present; it is always written when either holds
//! data, since consumers rely on presence to detect it.
//!
//! [`VerboseJsonEncoder`] writes self-describing objects keyed by the
//! unified column names instead, omitting absent values.
//!
//! Output is streamed fragment by fragment; whole rows are the largest
//! unit ever buffered. Decimals are written as plain JSON number tokens so
//! no float round-trip occurs.

use std::io::Write;
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::datum::{Datum, DatumKind, NamedSeries, Statistics};
use crate::error::{Error, Result};
use crate::metadata::{MetadataProvider, StreamMetadata};

use super::columns::{ColumnSchema, DerivedColumns};
use super::{format_decimal, Attributes, DatumEncoder, EncoderState};

/// JSON-escape a string fragment
fn json_string(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?)
}

/// Render an optional decimal as a JSON token
fn decimal_token(value: Option<&Decimal>) -> String {
    match value {
        Some(v) => format_decimal(v),
        None => "null".to_string(),
    }
}

/// Write the shared envelope prefix up to (and excluding) the `data` key
fn write_envelope_prefix<W: Write>(
    writer: &mut W,
    success: bool,
    total_results: Option<u64>,
    starting_offset: Option<u64>,
    expected_results: Option<u64>,
) -> Result<()> {
    let mut head = String::from("{");
    if success {
        head.push_str("\"success\":true,");
    }
    if let Some(count) = expected_results {
        head.push_str(&format!("\"returnedResultCount\":{},", count));
    }
    if let Some(offset) = starting_offset {
        head.push_str(&format!("\"startingOffset\":{},", offset));
    }
    if let Some(total) = total_results {
        head.push_str(&format!("\"totalResultCount\":{},", total));
    }
    writer.write_all(head.as_bytes())?;
    Ok(())
}

// ============================================================================
// Compact Positional Encoder
// ============================================================================

/// Positional JSON encoder with an up-front `meta` array
pub struct CompactJsonEncoder<W: Write> {
    writer: W,
    provider: Option<Arc<dyn MetadataProvider>>,
    meta_order: Vec<Uuid>,
    success: bool,
    rows_written: bool,
    state: EncoderState,
}

impl<W: Write> CompactJsonEncoder<W> {
    /// Create an encoder writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            provider: None,
            meta_order: Vec::new(),
            success: false,
            rows_written: false,
            state: EncoderState::Created,
        }
    }

    /// Include a `success: true` field in the envelope
    pub fn with_success_flag(mut self) -> Self {
        self.success = true;
        self
    }

    /// Consume the encoder and return the underlying sink
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn meta_index(&self, stream_id: Uuid) -> Option<usize> {
        self.meta_order.iter().position(|id| *id == stream_id)
    }

    fn render_row(&self, datum: &Datum, meta: &StreamMetadata, index: usize) -> Result<String> {
        let mut row = format!("[{}", index);
        match &datum.kind {
            DatumKind::Instant => {
                row.push_str(&format!(",{}", datum.timestamp.timestamp_millis()));
                let instantaneous = NamedSeries::new(
                    &meta.instantaneous_names,
                    &datum.properties.instantaneous,
                )?;
                for (_, value) in instantaneous.iter() {
                    row.push(',');
                    row.push_str(&decimal_token(value));
                }
                let accumulating = NamedSeries::new(
                    &meta.accumulating_names,
                    &datum.properties.accumulating,
                )?;
                for (_, value) in accumulating.iter() {
                    row.push(',');
                    row.push_str(&decimal_token(value));
                }
                // size optimization: drop an all-empty status/tag tail
                if !(datum.properties.status_is_empty() && datum.properties.tags.is_empty()) {
                    let status =
                        NamedSeries::new(&meta.status_names, &datum.properties.status)?;
                    for (_, value) in status.iter() {
                        row.push(',');
                        match value {
                            Some(v) => row.push_str(&json_string(v)?),
                            None => row.push_str("null"),
                        }
                    }
                    for tag in &datum.properties.tags {
                        row.push(',');
                        row.push_str(&json_string(tag)?);
                    }
                }
            }
            DatumKind::Aggregate { statistics, .. } => {
                row.push_str(&format!(
                    ",[{},null]",
                    datum.timestamp.timestamp_millis()
                ));
                self.render_statistic_arrays(&mut row, datum, meta, statistics)?;
            }
            DatumKind::Reading {
                statistics,
                end_timestamp,
                ..
            } => {
                row.push_str(&format!(
                    ",[{},{}]",
                    datum.timestamp.timestamp_millis(),
                    end_timestamp.timestamp_millis()
                ));
                self.render_statistic_arrays(&mut row, datum, meta, statistics)?;
            }
        }
        row.push(']');
        Ok(row)
    }

    fn render_statistic_arrays(
        &self,
        row: &mut String,
        datum: &Datum,
        meta: &StreamMetadata,
        statistics: &Statistics,
    ) -> Result<()> {
        let instantaneous =
            NamedSeries::new(&meta.instantaneous_names, &datum.properties.instantaneous)?;
        for (i, (_, value)) in instantaneous.iter().enumerate() {
            row.push(',');
            let stats = statistics.instantaneous.get(i).and_then(Option::as_ref);
            if value.is_none() && stats.is_none() {
                row.push_str("null");
                continue;
            }
            row.push('[');
            row.push_str(&decimal_token(value));
            match stats {
                Some(s) => row.push_str(&format!(
                    ",{},{},{}",
                    s.count,
                    format_decimal(&s.minimum),
                    format_decimal(&s.maximum)
                )),
                None => row.push_str(",null,null,null"),
            }
            row.push(']');
        }

        let accumulating =
            NamedSeries::new(&meta.accumulating_names, &datum.properties.accumulating)?;
        for (i, (_, value)) in accumulating.iter().enumerate() {
            row.push(',');
            let stats = statistics.accumulating.get(i).and_then(Option::as_ref);
            if value.is_none() && stats.is_none() {
                row.push_str("null");
                continue;
            }
            row.push('[');
            row.push_str(&decimal_token(value));
            match stats {
                Some(s) => row.push_str(&format!(
                    ",{},{}",
                    format_decimal(&s.starting),
                    format_decimal(&s.ending)
                )),
                None => row.push_str(",null,null"),
            }
            row.push(']');
        }
        Ok(())
    }
}

impl<W: Write> DatumEncoder for CompactJsonEncoder<W> {
    fn start(
        &mut self,
        total_results: Option<u64>,
        starting_offset: Option<u64>,
        expected_results: Option<u64>,
        attributes: &Attributes,
    ) -> Result<()> {
        self.state.expect_created()?;
        let provider = attributes.metadata_provider()?;

        write_envelope_prefix(
            &mut self.writer,
            self.success,
            total_results,
            starting_offset,
            expected_results,
        )?;

        let stream_ids = provider.stream_ids().unwrap_or_default();
        let mut metas: Vec<&StreamMetadata> = Vec::with_capacity(stream_ids.len());
        self.meta_order.clear();
        for id in stream_ids {
            if let Some(meta) = provider.metadata_for_stream(id) {
                if !self.meta_order.contains(&id) {
                    self.meta_order.push(id);
                    metas.push(meta);
                }
            }
        }
        let meta_json = serde_json::to_string(&metas)?;
        self.writer
            .write_all(format!("\"meta\":{},\"data\":[", meta_json).as_bytes())?;

        self.provider = Some(provider);
        self.state = EncoderState::Started;
        Ok(())
    }

    fn handle_result_item(&mut self, datum: &Datum) -> Result<()> {
        self.state.expect_started()?;
        let index = self
            .meta_index(datum.stream_id)
            .ok_or(Error::UnknownStream(datum.stream_id))?;
        // provider is set once started; the borrow is released before writing
        let meta = self
            .provider
            .as_ref()
            .and_then(|p| p.metadata_for_stream(datum.stream_id))
            .ok_or(Error::UnknownStream(datum.stream_id))?
            .clone();

        let row = self.render_row(datum, &meta, index)?;
        if self.rows_written {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(row.as_bytes())?;
        self.rows_written = true;
        Ok(())
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
        if self.state == EncoderState::Started {
            // tolerate an already-closed sink
            let _ = self.writer.write_all(b"]}");
            let _ = self.writer.flush();
        }
        self.state = EncoderState::Closed;
        Ok(())
    }
}

// ============================================================================
// Verbose Encoder
// ============================================================================

/// Self-describing JSON encoder; rows are objects keyed by the unified
/// column names
pub struct VerboseJsonEncoder<W: Write> {
    writer: W,
    provider: Option<Arc<dyn MetadataProvider>>,
    schema: Option<ColumnSchema>,
    rows_written: bool,
    state: EncoderState,
}

impl<W: Write> VerboseJsonEncoder<W> {
    /// Create an encoder writing to `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            provider: None,
            schema: None,
            rows_written: false,
            state: EncoderState::Created,
        }
    }

    /// Consume the encoder and return the underlying sink
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn render_row(
        &self,
        datum: &Datum,
        meta: &StreamMetadata,
        schema: &ColumnSchema,
    ) -> Result<String> {
        let mut row = String::from("{");
        match &datum.kind {
            DatumKind::Instant | DatumKind::Aggregate { .. } => {
                let key = if datum.is_aggregate() { "ts_start" } else { "ts" };
                row.push_str(&format!(
                    "\"{}\":{}",
                    key,
                    datum.timestamp.timestamp_millis()
                ));
            }
            DatumKind::Reading { end_timestamp, .. } => {
                row.push_str(&format!(
                    "\"ts_start\":{},\"ts_end\":{}",
                    datum.timestamp.timestamp_millis(),
                    end_timestamp.timestamp_millis()
                ));
            }
        }
        row.push_str(&format!(
            ",\"streamId\":{},\"objectId\":{},\"sourceId\":{}",
            json_string(&datum.stream_id.to_string())?,
            meta.object_id,
            json_string(&meta.source_id)?
        ));

        let instantaneous =
            NamedSeries::new(&meta.instantaneous_names, &datum.properties.instantaneous)?;
        for (i, (name, value)) in instantaneous.iter().enumerate() {
            let Some(slot) = schema.slot_of(name) else {
                continue;
            };
            if let Some(v) = value {
                row.push_str(&format!(",{}:{}", json_string(name)?, format_decimal(v)));
            }
            if slot.derived == DerivedColumns::Instantaneous {
                if let Some(stats) = datum
                    .statistics()
                    .and_then(|s| s.instantaneous.get(i))
                    .and_then(Option::as_ref)
                {
                    row.push_str(&format!(
                        ",{}:{},{}:{},{}:{}",
                        json_string(&format!("{}_count", name))?,
                        stats.count,
                        json_string(&format!("{}_min", name))?,
                        format_decimal(&stats.minimum),
                        json_string(&format!("{}_max", name))?,
                        format_decimal(&stats.maximum)
                    ));
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
                row.push_str(&format!(",{}:{}", json_string(name)?, format_decimal(v)));
            }
            if slot.derived == DerivedColumns::Accumulating {
                if let Some(stats) = datum
                    .statistics()
                    .and_then(|s| s.accumulating.get(i))
                    .and_then(Option::as_ref)
                {
                    row.push_str(&format!(
                        ",{}:{},{}:{}",
                        json_string(&format!("{}_start", name))?,
                        format_decimal(&stats.starting),
                        json_string(&format!("{}_end", name))?,
                        format_decimal(&stats.ending)
                    ));
                }
            }
        }

        let status = NamedSeries::new(&meta.status_names, &datum.properties.status)?;
        for (name, value) in status.iter() {
            if schema.slot_of(name).is_none() {
                continue;
            }
            if let Some(v) = value {
                row.push_str(&format!(",{}:{}", json_string(name)?, json_string(v)?));
            }
        }

        if !datum.properties.tags.is_empty() {
            let tags: Vec<String> = datum
                .properties
                .tags
                .iter()
                .map(|t| json_string(t))
                .collect::<Result<_>>()?;
            row.push_str(&format!(",\"tags\":[{}]", tags.join(",")));
        }

        row.push('}');
        Ok(row)
    }
}

impl<W: Write> DatumEncoder for VerboseJsonEncoder<W> {
    fn start(
        &mut self,
        total_results: Option<u64>,
        starting_offset: Option<u64>,
        expected_results: Option<u64>,
        attributes: &Attributes,
    ) -> Result<()> {
        self.state.expect_created()?;
        let provider = attributes.metadata_provider()?;
        write_envelope_prefix(
            &mut self.writer,
            false,
            total_results,
            starting_offset,
            expected_results,
        )?;
        self.writer.write_all(b"\"data\":[")?;
        self.provider = Some(provider);
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
            self.schema = Some(ColumnSchema::resolve(
                provider.as_ref(),
                datum.is_aggregate(),
            ));
        }
        let meta = provider
            .metadata_for_stream(datum.stream_id)
            .ok_or(Error::UnknownStream(datum.stream_id))?
            .clone();
        let Some(schema) = self.schema.as_ref() else {
            return Err(Error::configuration("column schema not resolved"));
        };

        let row = self.render_row(datum, &meta, schema)?;
        if self.rows_written {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(row.as_bytes())?;
        self.rows_written = true;
        Ok(())
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
        if self.state == EncoderState::Started {
            let _ = self.writer.write_all(b"]}");
            let _ = self.writer.flush();
        }
        self.state = EncoderState::Closed;
        Ok(())
    }
}
