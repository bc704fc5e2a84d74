//! Error types for the decoding engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a decode window could not be turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingReason {
    /// The window still ended mid-character when the next chunk would have
    /// pushed it past the configured maximum.
    WindowExceeded,

    /// The window contains bytes that are not UTF-8 no matter what follows.
    InvalidSequence,

    /// The stream ended in the middle of a multi-byte character.
    Truncated,
}

impl std::fmt::Display for FramingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WindowExceeded => f.write_str("decode window limit exceeded"),
            Self::InvalidSequence => f.write_str("invalid UTF-8 sequence"),
            Self::Truncated => f.write_str("stream ended inside a multi-byte character"),
        }
    }
}

/// Errors that can occur while streaming a compressed source.
#[derive(Error, Debug)]
pub enum Error {
    /// A chunk boundary could not be resolved into valid text.
    #[error("framing error after {window_bytes} bytes (stream offset {stream_offset}): {reason}")]
    Framing {
        /// What went wrong.
        reason: FramingReason,
        /// Size of the decode window when decoding gave up.
        window_bytes: usize,
        /// Decompressed bytes read from the stream so far.
        stream_offset: u64,
    },

    /// Invalid decoder configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (open, read, or a corrupt compressed frame).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a framing error.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Framing { .. })
    }
}
