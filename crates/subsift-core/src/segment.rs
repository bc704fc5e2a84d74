//! Newline segmentation of decoded text chunks.
//!
//! Chunks from [`ChunkedTextDecoder`](crate::decode::ChunkedTextDecoder) cut
//! lines at arbitrary points. [`LineSegmenter`] carries the unterminated tail
//! of each chunk forward and yields only complete lines, each exactly once
//! and in stream order.

/// One newline-delimited line from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: String,
    offset: u64,
}

impl Record {
    /// The line trimmed of surrounding whitespace.
    pub fn text(&self) -> &str {
        self.line.trim()
    }

    /// The line exactly as it appeared, without its newline.
    pub fn raw(&self) -> &str {
        &self.line
    }

    /// Source position reported when this record's chunk was read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Consume the record, returning the raw line.
    pub fn into_line(self) -> String {
        self.line
    }
}

/// Splits a stream of text chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineSegmenter {
    pending: String,
    last_offset: u64,
}

impl LineSegmenter {
    /// Create an empty segmenter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate over the lines it completes.
    ///
    /// Every record yielded by the returned iterator carries `offset`. Lines
    /// the caller does not pull before dropping the iterator stay buffered and
    /// come out of the next `feed` or [`finish`](Self::finish).
    pub fn feed(&mut self, text: &str, offset: u64) -> Records<'_> {
        self.pending.push_str(text);
        self.last_offset = offset;
        Records {
            buffer: &mut self.pending,
            cursor: 0,
            offset,
        }
    }

    /// Take whatever remains as a final, unterminated record.
    pub fn finish(&mut self) -> Option<Record> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Record {
            line: std::mem::take(&mut self.pending),
            offset: self.last_offset,
        })
    }

    /// Bytes of text currently held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Lazy iterator over the lines completed by one [`LineSegmenter::feed`].
#[derive(Debug)]
pub struct Records<'a> {
    buffer: &'a mut String,
    cursor: usize,
    offset: u64,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let rest = &self.buffer[self.cursor..];
        let end = rest.find('\n')?;
        let line = rest[..end].to_string();
        self.cursor += end + 1;
        Some(Record {
            line,
            offset: self.offset,
        })
    }
}

impl Drop for Records<'_> {
    fn drop(&mut self) {
        self.buffer.drain(..self.cursor);
    }
}
