//! Per-category JSON array sinks.
//!
//! Each [`AggregateSink`] writes one file holding a single JSON array:
//!
//! ```text
//! open     ─► [
//! append   ─► {...}        (first element)
//! append   ─► ,{...}       (every later element)
//! close    ─► ]
//! ```
//!
//! Thread-safe: the writer and element count sit behind one mutex, so an
//! append is atomic with respect to other appends on the same sink.
//!
//! A process killed before [`SinkSet::close_all`] (or before the sinks are
//! dropped) leaves files without their closing `]`.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mutable state of an open sink.
struct SinkState {
    /// `None` once the closing bracket has been written.
    writer: Option<BufWriter<File>>,

    /// Elements written; zero means the next element needs no comma.
    written: usize,
}

/// Append-only JSON array file for one category.
pub struct AggregateSink {
    category: String,
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl AggregateSink {
    /// Create the file (and its parent directories) and write the opening `[`.
    pub fn create(category: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let category = category.into();
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        writer.write_all(b"[")?;

        debug!("Opened sink for {} at {}", category, path.display());

        Ok(Self {
            category,
            path,
            state: Mutex::new(SinkState {
                writer: Some(writer),
                written: 0,
            }),
        })
    }

    /// Append one element.
    pub fn append(&self, value: &Value) -> Result<()> {
        let mut state = self.state.lock();
        let element = encode_element(value, state.written > 0)?;

        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| Error::Sink(format!("sink '{}' is closed", self.category)))?;
        writer.write_all(&element)?;

        state.written += 1;
        Ok(())
    }

    /// Write the closing `]` and flush. Returns the element count.
    ///
    /// Closing an already closed sink is a no-op.
    pub fn close(&self) -> Result<usize> {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            writer.write_all(b"]")?;
            writer.flush()?;
            debug!(
                "Closed sink for {}: {} records at {}",
                self.category,
                state.written,
                self.path.display()
            );
        }
        Ok(state.written)
    }

    /// Category this sink collects.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Elements written so far.
    pub fn written(&self) -> usize {
        self.state.lock().written
    }

    /// Whether the closing bracket has been written.
    pub fn is_closed(&self) -> bool {
        self.state.lock().writer.is_none()
    }
}

impl Drop for AggregateSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing sink {}: {}", self.category, e);
        }
    }
}

/// Serialize one array element, with its leading comma when not first.
///
/// Encoded in full before anything touches the file, so a failed encode
/// leaves the array intact.
fn encode_element(value: &Value, needs_comma: bool) -> Result<Vec<u8>> {
    let mut element = Vec::with_capacity(256);
    if needs_comma {
        element.push(b',');
    }
    serde_json::to_writer(&mut element, value).map_err(std::io::Error::from)?;
    Ok(element)
}

/// Final state of one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    /// Category name.
    pub category: String,

    /// Output file path.
    pub path: PathBuf,

    /// Elements written.
    pub records: usize,
}

/// The full set of category sinks for a run.
///
/// Sinks are opened together by [`SinkSet::open`] and closed together by
/// [`SinkSet::close_all`]; any sink still open when the set is dropped is
/// closed then.
pub struct SinkSet {
    sinks: Vec<AggregateSink>,
    index: HashMap<String, usize>,
}

impl SinkSet {
    /// Open one sink per distinct category, at the path `path_for` returns.
    ///
    /// Repeated category names are opened once; the first occurrence wins.
    pub fn open<F>(categories: &[String], path_for: F) -> Result<Self>
    where
        F: Fn(&str) -> PathBuf,
    {
        let mut sinks = Vec::with_capacity(categories.len());
        let mut index = HashMap::with_capacity(categories.len());

        for category in categories {
            if index.contains_key(category) {
                warn!("Category {} listed more than once; using the first entry", category);
                continue;
            }
            let sink = AggregateSink::create(category.as_str(), path_for(category))?;
            index.insert(category.clone(), sinks.len());
            sinks.push(sink);
        }

        info!("Opened {} category sinks", sinks.len());
        Ok(Self { sinks, index })
    }

    /// Position of `category` in the set.
    pub fn position(&self, category: &str) -> Option<usize> {
        self.index.get(category).copied()
    }

    /// Sink for `category`.
    pub fn get(&self, category: &str) -> Option<&AggregateSink> {
        self.position(category).map(|i| &self.sinks[i])
    }

    /// Sink at `position`.
    pub fn at(&self, position: usize) -> Option<&AggregateSink> {
        self.sinks.get(position)
    }

    /// Iterate over the sinks in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &AggregateSink> {
        self.sinks.iter()
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Close every sink.
    ///
    /// All sinks are attempted even if one fails; the first error is returned.
    pub fn close_all(&self) -> Result<Vec<SinkSummary>> {
        let mut summaries = Vec::with_capacity(self.sinks.len());
        let mut first_error = None;

        for sink in &self.sinks {
            match sink.close() {
                Ok(records) => summaries.push(SinkSummary {
                    category: sink.category().to_string(),
                    path: sink.path().to_path_buf(),
                    records,
                }),
                Err(e) => {
                    warn!("Failed to close sink {}: {}", sink.category(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}
