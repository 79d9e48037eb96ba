//! Datum Codec - wire formats and query criteria for multi-stream sensor data
//!
//! This library ingests and emits time-series sensor readings ("datum")
//! produced by many heterogeneous devices, each stream described by its own
//! schema. It provides:
//!
//! - Incremental encoders to CSV, compact positional JSON and verbose JSON,
//!   with cross-stream column deduplication and no result-set re-buffering
//! - The inverse CSV decoder, tolerant of stale or unknown streams
//! - Normalization of legacy query-filter shapes into one canonical
//!   criteria structure
//!
//! Persistence, authentication and transport are external collaborators;
//! callers supply datum rows and a [`metadata::MetadataProvider`] and drive
//! the codecs directly.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{TimeZone, Utc};
//! use datum_codec::codec::csv::CsvDatumEncoder;
//! use datum_codec::codec::{Attributes, DatumEncoder};
//! use datum_codec::datum::{Datum, Properties};
//! use datum_codec::metadata::{MetadataProvider, StaticMetadataProvider, StreamMetadata};
//! use datum_codec::types::ObjectKind;
//! use uuid::Uuid;
//!
//! let meta = StreamMetadata::new(
//!     Uuid::new_v4(),
//!     ObjectKind::Node,
//!     1,
//!     "meter/1",
//!     "UTC",
//!     vec!["watts".to_string()],
//!     Vec::new(),
//!     Vec::new(),
//! )
//! .unwrap();
//! let stream_id = meta.stream_id;
//! let provider: Arc<dyn MetadataProvider> =
//!     Arc::new(StaticMetadataProvider::new(vec![meta]));
//!
//! let mut encoder = CsvDatumEncoder::new(Vec::new());
//! encoder
//!     .start(None, None, None, &Attributes::with_provider(provider))
//!     .unwrap();
//! let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! encoder
//!     .handle_result_item(&Datum::instant(stream_id, ts, Properties::new()))
//!     .unwrap();
//! encoder.close().unwrap();
//!
//! let csv = String::from_utf8(encoder.into_inner()).unwrap();
//! assert!(csv.starts_with("ts,streamId,objectId,sourceId,watts,tags"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod criteria;
pub mod datum;
pub mod error;
pub mod metadata;
pub mod types;

// Re-export main types
pub use codec::{Attributes, DatumEncoder, METADATA_PROVIDER_ATTRIBUTE};
pub use criteria::{normalize, DatumCriteria};
pub use datum::{Datum, DatumKind, Properties, Statistics};
pub use error::{Error, Result};
pub use metadata::{MetadataProvider, StaticMetadataProvider, StreamMetadata};
pub use types::{AggregationLevel, ObjectKind};
