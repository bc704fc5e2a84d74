//! Error types for the extraction pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a file or a run.
#[derive(Error, Debug)]
pub enum Error {
    /// Decoding engine error (framing, decoder configuration, source I/O).
    #[error(transparent)]
    Core(#[from] subsift_core::Error),

    /// I/O error (directory listing, sink writes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sink used after it was closed.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl Error {
    /// Whether this is a framing error from the decoder.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Core(inner) if inner.is_framing())
    }
}

/// Why a single record was skipped. Never fatal.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The line is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is valid JSON but not an object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// The object has no discriminator field.
    #[error("missing field '{0}'")]
    MissingField(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use subsift_core::FramingReason;

    #[test]
    fn test_framing_passthrough() {
        let err: Error = subsift_core::Error::Framing {
            reason: FramingReason::Truncated,
            window_bytes: 3,
            stream_offset: 99,
        }
        .into();
        assert!(err.is_framing());
        assert!(err.to_string().starts_with("framing error"));
    }

    #[test]
    fn test_io_is_not_framing() {
        let err: Error = std::io::Error::other("disk full").into();
        assert!(!err.is_framing());
        assert!(err.to_string().contains("disk full"));

        let core_io: Error = subsift_core::Error::Io(std::io::Error::other("bad frame")).into();
        assert!(!core_io.is_framing());
    }

    #[test]
    fn test_record_error_display() {
        let err = RecordError::MissingField("subreddit".to_string());
        assert_eq!(err.to_string(), "missing field 'subreddit'");
        assert_eq!(
            RecordError::NotAnObject.to_string(),
            "record is not a JSON object"
        );

        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: RecordError = json_err.into();
        assert!(err.to_string().starts_with("JSON parse error"));
    }
}
