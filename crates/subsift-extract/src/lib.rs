//! Sampled category extraction over paired archive dumps.
//!
//! # Modules
//!
//! - [`pairs`] - pair files across the two source trees and sample them
//! - [`router`] - parse records and pick a category sink
//! - [`sink`] - per-category JSON array writers
//! - [`report`] - where skipped records are reported
//! - [`driver`] - runs the pipeline over the sampled pairs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   PairSampler   │  comments/RC_* ⇄ submissions/RS_*, random subset
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ subsift-core    │  CompressedSource → ChunkedTextDecoder → LineSegmenter
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CategoryRouter  │  JSON parse, discriminator lookup
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     SinkSet     │  one JSON array file per category
//! └─────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod pairs;
pub mod report;
pub mod router;
pub mod sink;

pub use config::{DEFAULT_CATEGORIES, ExtractConfig};
pub use driver::{Driver, FileStats, RunStats};
pub use error::{Error, RecordError, Result};
pub use pairs::{FilePair, pair_files, sample_pairs};
pub use report::{CollectingReporter, IssueReporter, LogReporter, RecordIssue};
pub use router::{CategoryRouter, RouteOutcome};
pub use sink::{AggregateSink, SinkSet, SinkSummary};
