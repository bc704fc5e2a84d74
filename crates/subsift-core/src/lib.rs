//! Streaming core for subsift.
//!
//! This crate turns compressed newline-delimited JSON archives into a lazy
//! stream of text records under a fixed memory ceiling:
//!
//! - [`source`] - opens `.zst` / `.gz` archives and tracks compressed progress
//! - [`decode`] - chunked UTF-8 decoding with a bounded lookahead window
//! - [`segment`] - newline segmentation that carries partial lines across chunks
//! - [`metrics`] - Prometheus metrics helpers
//!
//! # Pipeline
//!
//! ```text
//! archive ─► CompressedSource ─► ChunkedTextDecoder ─► LineSegmenter ─► Record
//!            (zstd / gzip)       (text chunks)         (lines + offset)
//! ```

mod error;
pub mod decode;
pub mod metrics;
pub mod segment;
pub mod source;

pub use decode::{ChunkedTextDecoder, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_WINDOW, DecoderConfig};
pub use error::{Error, FramingReason, Result};
pub use segment::{LineSegmenter, Record, Records};
pub use source::{Codec, CompressedSource, ZSTD_WINDOW_LOG_MAX};
