//! Result encoders and the CSV decoder
//!
//! Encoders are stateful, incremental writers: they consume a metadata
//! provider plus a sequence of datum rows and emit a complete wire payload
//! without buffering the whole result set. Three encoders are provided:
//!
//! - [`csv::CsvDatumEncoder`] — tabular CSV with a unified cross-stream
//!   column schema
//! - [`json::CompactJsonEncoder`] — positional JSON rows with an up-front
//!   `meta` array
//! - [`json::VerboseJsonEncoder`] — self-describing JSON objects keyed by
//!   the unified column names
//!
//! [`csv_reader::CsvDatumReader`] is the inverse of the CSV encoder.
//!
//! # Protocol
//!
//! Every encoder follows the same state machine:
//!
//! ```text
//! start(total?, offset?, expected?, attributes)
//!   -> handle_result_item(datum)   (zero or more)
//!   -> flush()                     (zero or more)
//!   -> close()                     (exactly once, idempotent)
//! ```
//!
//! `start` requires a [`MetadataProvider`] under
//! [`METADATA_PROVIDER_ATTRIBUTE`]; its absence is a configuration error
//! raised before any output byte is written. Calls out of order are
//! configuration errors as well. A single encoder instance is confined to
//! one logical request; it is not safe for concurrent calls.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;

use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::metadata::MetadataProvider;

pub mod columns;
pub mod csv;
pub mod csv_reader;
pub mod json;

/// Attribute key carrying the `Arc<dyn MetadataProvider>` required by every
/// encoder at `start` time
pub const METADATA_PROVIDER_ATTRIBUTE: &str = "metadata-provider";

// ============================================================================
// Encoder Protocol
// ============================================================================

/// Incremental result encoder protocol
///
/// See the [module documentation](self) for the state machine. Row order in
/// the output equals call order exactly; no encoder reorders rows.
pub trait DatumEncoder {
    /// Begin the payload
    ///
    /// The optional counts are echoed into formats that carry them
    /// (`totalResultCount`, `startingOffset`, `returnedResultCount`).
    /// `attributes` must carry the metadata provider; a missing provider is
    /// a fatal configuration error and nothing is written.
    fn start(
        &mut self,
        total_results: Option<u64>,
        starting_offset: Option<u64>,
        expected_results: Option<u64>,
        attributes: &Attributes,
    ) -> Result<()>;

    /// Encode one datum row
    ///
    /// A row whose stream id the provider cannot resolve is a
    /// data-integrity violation: the encode operation aborts with
    /// [`Error::UnknownStream`].
    fn handle_result_item(&mut self, datum: &Datum) -> Result<()>;

    /// Flush buffered output to the underlying sink
    fn flush(&mut self) -> Result<()>;

    /// Finish the payload and release the sink
    ///
    /// Idempotent: a second call does nothing and does not write a
    /// duplicate terminator.
    fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Attributes
// ============================================================================

/// Typed runtime attributes handed to [`DatumEncoder::start`]
///
/// A small any-map keyed by fixed constant names. Values are stored once
/// and retrieved by concrete type.
#[derive(Default)]
pub struct Attributes {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    /// Create an empty attribute set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an attribute set carrying a metadata provider
    pub fn with_provider(provider: Arc<dyn MetadataProvider>) -> Self {
        let mut attrs = Self::new();
        attrs.insert(METADATA_PROVIDER_ATTRIBUTE, provider);
        attrs
    }

    /// Store a value under a key, replacing any previous value
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.values.insert(key, Box::new(value));
    }

    /// Retrieve a value by key and concrete type
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// The metadata provider required by every encoder
    ///
    /// Returns [`Error::Configuration`] when the attribute is absent.
    pub fn metadata_provider(&self) -> Result<Arc<dyn MetadataProvider>> {
        self.get::<Arc<dyn MetadataProvider>>(METADATA_PROVIDER_ATTRIBUTE)
            .cloned()
            .ok_or_else(|| {
                Error::configuration(format!(
                    "missing required '{}' attribute",
                    METADATA_PROVIDER_ATTRIBUTE
                ))
            })
    }
}

// ============================================================================
// Value Formatting
// ============================================================================

/// Render an instant as an ISO-8601 string with millisecond precision
pub(crate) fn format_instant(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render a decimal in plain (non-scientific) form
pub(crate) fn format_decimal(value: &Decimal) -> String {
    value.to_string()
}

/// Internal encoder lifecycle state shared by all encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncoderState {
    /// Constructed, `start` not yet called
    Created,
    /// `start` accepted, rows may arrive
    Started,
    /// `close` completed
    Closed,
}

impl EncoderState {
    /// Guard that rows may be written in this state
    pub(crate) fn expect_started(self) -> Result<()> {
        match self {
            EncoderState::Started => Ok(()),
            EncoderState::Created => Err(Error::configuration(
                "encoder not started; call start() first",
            )),
            EncoderState::Closed => Err(Error::configuration("encoder already closed")),
        }
    }

    /// Guard that `start` has not already run
    pub(crate) fn expect_created(self) -> Result<()> {
        match self {
            EncoderState::Created => Ok(()),
            _ => Err(Error::configuration("encoder already started")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::StaticMetadataProvider;

    #[test]
    fn test_attributes_typed_roundtrip() {
        let provider: Arc<dyn MetadataProvider> =
            Arc::new(StaticMetadataProvider::new(Vec::new()));
        let attrs = Attributes::with_provider(provider);
        assert!(attrs.metadata_provider().is_ok());
    }

    #[test]
    fn test_missing_provider_is_configuration_error() {
        let attrs = Attributes::new();
        assert!(matches!(
            attrs.metadata_provider(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_not_found() {
        let mut attrs = Attributes::new();
        attrs.insert(METADATA_PROVIDER_ATTRIBUTE, 42u32);
        assert!(attrs.metadata_provider().is_err());
        assert_eq!(attrs.get::<u32>(METADATA_PROVIDER_ATTRIBUTE), Some(&42));
    }

    #[test]
    fn test_format_instant_iso8601() {
        use chrono::TimeZone;
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        assert_eq!(format_instant(ts), "2024-03-01T12:30:45.000Z");
    }

    #[test]
    fn test_state_guards() {
        assert!(EncoderState::Created.expect_created().is_ok());
        assert!(EncoderState::Started.expect_created().is_err());
        assert!(EncoderState::Started.expect_started().is_ok());
        assert!(EncoderState::Closed.expect_started().is_err());
    }
}
