//! Compressed source files.
//!
//! A [`CompressedSource`] opens an archive, picks a decompressor from the
//! file extension, and counts how many compressed bytes have been pulled
//! from disk so callers can report progress against the file size.

use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest zstd window the decoder accepts (2 GiB). Dump archives are
/// compressed with `--long=31`, which the library rejects by default.
pub const ZSTD_WINDOW_LOG_MAX: u32 = 31;

/// Compression format, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Zstandard (`.zst`, `.zstd`).
    Zstd,
    /// Gzip (`.gz`).
    Gzip,
    /// Anything else is read as-is.
    Plain,
}

impl Codec {
    /// Detect the codec from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("zst") | Some("zstd") => Self::Zstd,
            Some("gz") => Self::Gzip,
            _ => Self::Plain,
        }
    }

    /// Whether this codec decompresses.
    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Wraps a reader and counts the bytes read through it.
struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// An open, decompressing handle on one archive file.
pub struct CompressedSource {
    path: PathBuf,
    codec: Codec,
    reader: Box<dyn Read + Send>,
    consumed: Arc<AtomicU64>,
    file_size: u64,
}

impl CompressedSource {
    /// Open `path`, choosing the decompressor from its extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::open_with_codec(path, Codec::from_path(path))
    }

    /// Open `path` with an explicit codec.
    pub fn open_with_codec(path: impl AsRef<Path>, codec: Codec) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let consumed = Arc::new(AtomicU64::new(0));
        let counted = CountingReader {
            inner: file,
            count: Arc::clone(&consumed),
        };

        let reader: Box<dyn Read + Send> = match codec {
            Codec::Zstd => {
                let mut decoder = zstd::stream::read::Decoder::new(counted)?;
                decoder.window_log_max(ZSTD_WINDOW_LOG_MAX)?;
                Box::new(decoder)
            }
            Codec::Gzip => Box::new(GzDecoder::new(BufReader::new(counted))),
            Codec::Plain => Box::new(BufReader::new(counted)),
        };

        tracing::debug!(
            "Opened {} ({:?}, {} bytes)",
            path.display(),
            codec,
            file_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            codec,
            reader,
            consumed,
            file_size,
        })
    }

    /// Path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Codec in use.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Compressed bytes read from disk so far.
    pub fn compressed_position(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Size of the file on disk.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Fraction of the compressed file consumed, in percent.
    pub fn percent_consumed(&self) -> f64 {
        if self.file_size == 0 {
            return 100.0;
        }
        (self.compressed_position() as f64 / self.file_size as f64) * 100.0
    }
}

impl Read for CompressedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for CompressedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedSource")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .field("file_size", &self.file_size)
            .field("consumed", &self.compressed_position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"{\"a\":1}\n{\"a\":2}\n";

    #[test]
    fn test_codec_from_path() {
        assert_eq!(Codec::from_path(Path::new("RC_2019-01.zst")), Codec::Zstd);
        assert_eq!(Codec::from_path(Path::new("RC_2019-01.ZST")), Codec::Zstd);
        assert_eq!(Codec::from_path(Path::new("x.zstd")), Codec::Zstd);
        assert_eq!(Codec::from_path(Path::new("x.jsonl.gz")), Codec::Gzip);
        assert_eq!(Codec::from_path(Path::new("x.jsonl")), Codec::Plain);
        assert_eq!(Codec::from_path(Path::new("noext")), Codec::Plain);
        assert!(Codec::Zstd.is_compressed());
        assert!(!Codec::Plain.is_compressed());
    }

    #[test]
    fn test_read_zstd() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("RC_test.zst");
        std::fs::write(&path, zstd::encode_all(PAYLOAD, 3).unwrap()).unwrap();

        let mut source = CompressedSource::open(&path).unwrap();
        assert_eq!(source.codec(), Codec::Zstd);

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, PAYLOAD);
        assert_eq!(source.compressed_position(), source.file_size());
        assert!((source.percent_consumed() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_gzip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(PAYLOAD).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut source = CompressedSource::open(&path).unwrap();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, PAYLOAD);
    }

    #[test]
    fn test_read_plain() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("events.jsonl");
        std::fs::write(&path, PAYLOAD).unwrap();

        let mut source = CompressedSource::open(&path).unwrap();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, PAYLOAD);
    }

    #[test]
    fn test_corrupt_zstd_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.zst");
        std::fs::write(&path, b"definitely not zstd").unwrap();

        let mut source = CompressedSource::open(&path).unwrap();
        let mut out = Vec::new();
        assert!(source.read_to_end(&mut out).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let result = CompressedSource::open("/nonexistent/RC_2020-01.zst");
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
