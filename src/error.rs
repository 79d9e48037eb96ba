//! Error types for the datum codec

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the codec
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing required attribute, invalid header,
    /// protocol misuse). Raised before any partial output is produced.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A datum references a stream id the metadata provider does not know.
    /// Fatal for the encode operation: the column schema may already assume
    /// a different set of streams.
    #[error("No metadata available for stream {0}")]
    UnknownStream(Uuid),

    /// A value could not be parsed during decoding
    #[error("Unparsable value '{value}' for column '{column}'")]
    Malformed {
        /// Column the value was read from
        column: String,
        /// The offending raw text
        value: String,
    },

    /// A value array is longer than its metadata name array
    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    /// IO error from the underlying sink or source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a malformed-value error
    pub fn malformed(column: impl Into<String>, value: impl Into<String>) -> Self {
        Error::Malformed {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::configuration("metadata provider missing");
        assert_eq!(
            err.to_string(),
            "Configuration error: metadata provider missing"
        );

        let err = Error::malformed("watts", "abc");
        assert_eq!(err.to_string(), "Unparsable value 'abc' for column 'watts'");
    }

    #[test]
    fn test_unknown_stream_display() {
        let id = Uuid::nil();
        let err = Error::UnknownStream(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
