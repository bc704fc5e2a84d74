//! Chunked UTF-8 decoding over a byte stream.
//!
//! Archives are read in large fixed-size chunks, but chunk boundaries know
//! nothing about character boundaries: a multi-byte character can straddle
//! two reads. [`ChunkedTextDecoder`] handles this by extending the decode
//! window up to one chunk at a time until the window decodes cleanly, and
//! gives up with a framing error once the window is full.
//!
//! # Window Growth
//!
//! ```text
//! read chunk ──► decode ──ok──► return text, reset window
//!                  │
//!            incomplete tail
//!                  │
//!     window >= max_window? ──yes──► Error::Framing(WindowExceeded)
//!                  │ no
//!                  └──► read min(chunk, room left), append, decode again
//! ```

use crate::error::{Error, FramingReason, Result};
use std::io::Read;

/// Default bytes read per attempt (128 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 27;

/// Default ceiling on the decode window (1 GiB).
pub const DEFAULT_MAX_WINDOW: usize = 1 << 30;

/// Configuration for [`ChunkedTextDecoder`].
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    /// Bytes requested from the reader per attempt.
    pub chunk_size: usize,

    /// Hard ceiling on bytes held while resolving one decode.
    pub max_window: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_window: DEFAULT_MAX_WINDOW,
        }
    }
}

impl DecoderConfig {
    /// Check that the window can hold at least one chunk.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be non-zero".to_string()));
        }
        if self.max_window < self.chunk_size {
            return Err(Error::Config(format!(
                "max window ({}) must be at least the chunk size ({})",
                self.max_window, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Reads fixed-size chunks from `R` and decodes them to UTF-8 text.
pub struct ChunkedTextDecoder<R> {
    reader: R,
    config: DecoderConfig,
    bytes_read: u64,
    peak_window: usize,
}

impl<R: Read> ChunkedTextDecoder<R> {
    /// Create a decoder over `reader`.
    pub fn new(reader: R, config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader,
            config,
            bytes_read: 0,
            peak_window: 0,
        })
    }

    /// Decode the next chunk of text.
    ///
    /// Returns `Ok(None)` once the reader is exhausted and nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Framing`] when the window cannot be decoded within
    /// `max_window` bytes, and [`Error::Io`] when the reader fails.
    pub fn next_chunk(&mut self) -> Result<Option<String>> {
        let mut window = Vec::new();
        if self.fill(&mut window, self.config.chunk_size)? == 0 {
            return Ok(None);
        }

        loop {
            let err = match String::from_utf8(window) {
                Ok(text) => return Ok(Some(text)),
                Err(err) => err,
            };

            let incomplete_tail = err.utf8_error().error_len().is_none();
            window = err.into_bytes();

            if !incomplete_tail {
                return Err(self.framing(FramingReason::InvalidSequence, window.len()));
            }
            if window.len() >= self.config.max_window {
                return Err(self.framing(FramingReason::WindowExceeded, window.len()));
            }
            let room = self.config.max_window - window.len();

            tracing::debug!(
                "Chunk ends mid-character at stream offset {}, extending window past {} bytes",
                self.bytes_read,
                window.len()
            );

            if self.fill(&mut window, self.config.chunk_size.min(room))? == 0 {
                return Err(self.framing(FramingReason::Truncated, window.len()));
            }
        }
    }

    /// Append up to `limit` bytes to `window`, returning the number of bytes read.
    fn fill(&mut self, window: &mut Vec<u8>, limit: usize) -> Result<usize> {
        let n = (&mut self.reader).take(limit as u64).read_to_end(window)?;
        self.bytes_read += n as u64;
        self.peak_window = self.peak_window.max(window.len());
        Ok(n)
    }

    fn framing(&self, reason: FramingReason, window_bytes: usize) -> Error {
        Error::Framing {
            reason,
            window_bytes,
            stream_offset: self.bytes_read,
        }
    }

    /// Decompressed bytes pulled from the reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Largest window held so far.
    pub fn peak_window(&self) -> usize {
        self.peak_window
    }

    /// Get the configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consume the decoder, returning the reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
