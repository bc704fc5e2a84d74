//! Orchestration of an extraction run.
//!
//! The [`Driver`] streams every file of every sampled pair through the
//! decode → segment → route pipeline:
//!
//! ```text
//! [FilePair] ─► CompressedSource ─► ChunkedTextDecoder ─► LineSegmenter ─► CategoryRouter ─► SinkSet
//! ```
//!
//! A file that fails (framing error, corrupt archive) is abandoned and the run
//! moves on, unless `continue_on_error` is off. With `jobs > 1`, pairs are
//! spread over scoped worker threads; decoder and segmenter state is private
//! to each file and only the sinks are shared.

use crate::config::ExtractConfig;
use crate::error::{Error, Result};
use crate::pairs::{self, FilePair};
use crate::report::IssueReporter;
use crate::router::{CategoryRouter, RouteOutcome};
use crate::sink::SinkSet;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use subsift_core::metrics::record_bytes;
use subsift_core::{ChunkedTextDecoder, CompressedSource, LineSegmenter, Record};
use tracing::{debug, info, warn};

/// Counters for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Non-blank records seen.
    pub records: usize,
    /// Whitespace-only lines.
    pub blank: usize,
    /// Records appended to a sink.
    pub matched: usize,
    /// Records whose discriminator matched no category.
    pub unmatched: usize,
    /// Records skipped as malformed.
    pub invalid: usize,
    /// Unterminated final lines that were dropped.
    pub dropped_tails: usize,
    /// Source bytes consumed (compressed bytes for archives).
    pub source_bytes: u64,
    /// Decompressed bytes decoded.
    pub decoded_bytes: u64,
    /// Stopped early by a shutdown request.
    pub interrupted: bool,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Pairs handed to the run.
    pub pairs: usize,
    /// Files streamed to completion.
    pub files_processed: usize,
    /// Files abandoned after an error.
    pub files_failed: usize,
    /// Of the failed files, how many hit a framing error.
    pub framing_errors: usize,
    /// Non-blank records seen.
    pub records: usize,
    /// Whitespace-only lines.
    pub blank: usize,
    /// Records appended to a sink.
    pub matched: usize,
    /// Records whose discriminator matched no category.
    pub unmatched: usize,
    /// Records skipped as malformed.
    pub invalid: usize,
    /// Unterminated final lines that were dropped.
    pub dropped_tails: usize,
    /// Compressed bytes consumed.
    pub source_bytes: u64,
    /// Decompressed bytes decoded.
    pub decoded_bytes: u64,
    /// The run stopped early on a shutdown request.
    pub interrupted: bool,
}

impl RunStats {
    fn absorb(&mut self, file: &FileStats) {
        self.records += file.records;
        self.blank += file.blank;
        self.matched += file.matched;
        self.unmatched += file.unmatched;
        self.invalid += file.invalid;
        self.dropped_tails += file.dropped_tails;
        self.source_bytes += file.source_bytes;
        self.decoded_bytes += file.decoded_bytes;
        self.interrupted |= file.interrupted;
    }

    fn merge(&mut self, other: RunStats) {
        self.files_processed += other.files_processed;
        self.files_failed += other.files_failed;
        self.framing_errors += other.framing_errors;
        self.records += other.records;
        self.blank += other.blank;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.invalid += other.invalid;
        self.dropped_tails += other.dropped_tails;
        self.source_bytes += other.source_bytes;
        self.decoded_bytes += other.decoded_bytes;
        self.interrupted |= other.interrupted;
    }
}

/// Runs the extraction pipeline over sampled file pairs.
pub struct Driver {
    config: ExtractConfig,
    router: CategoryRouter,
    running: Arc<AtomicBool>,
    aborted: AtomicBool,
}

impl Driver {
    /// Create a driver writing into `sinks` and reporting bad records to `reporter`.
    pub fn new(
        config: ExtractConfig,
        sinks: Arc<SinkSet>,
        reporter: Arc<dyn IssueReporter>,
    ) -> Result<Self> {
        config.validate()?;
        let router = CategoryRouter::new(config.field.clone(), sinks, reporter);
        Ok(Self {
            config,
            router,
            running: Arc::new(AtomicBool::new(true)),
            aborted: AtomicBool::new(false),
        })
    }

    /// Stop at the next chunk or record once `running` is cleared.
    pub fn with_shutdown_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.aborted.load(Ordering::SeqCst)
    }

    /// Find every pair across the configured source trees.
    pub fn discover_pairs(&self) -> Result<Vec<FilePair>> {
        pairs::pair_files(&self.config.source_dirs, self.config.prefix_len)
    }

    /// Draw the configured sample from `all`.
    pub fn sample(&self, all: &[FilePair]) -> Vec<FilePair> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let sample = pairs::sample_pairs(
            all,
            self.config.sample_fraction,
            self.config.with_replacement,
            &mut rng,
        );
        info!(
            "Sampled {} of {} pairs ({}replacement)",
            sample.len(),
            all.len(),
            if self.config.with_replacement { "with " } else { "without " }
        );
        sample
    }

    /// Process every pair, returning run statistics.
    ///
    /// With `continue_on_error` off, the first failing file aborts the run.
    pub fn run(&self, pairs: &[FilePair]) -> Result<RunStats> {
        let mut stats = if self.config.jobs <= 1 || pairs.len() <= 1 {
            let mut stats = RunStats::default();
            for (idx, pair) in pairs.iter().enumerate() {
                if !self.is_running() {
                    break;
                }
                self.process_pair(idx, pairs.len(), pair, &mut stats)?;
            }
            stats
        } else {
            self.run_parallel(pairs)?
        };

        stats.pairs = pairs.len();
        stats.interrupted |= !self.running.load(Ordering::SeqCst);
        Ok(stats)
    }

    fn run_parallel(&self, pairs: &[FilePair]) -> Result<RunStats> {
        let workers = self.config.jobs.min(pairs.len());
        info!("Processing {} pairs on {} workers", pairs.len(), workers);

        let (sender, receiver) = crossbeam_channel::unbounded::<(usize, &FilePair)>();
        for item in pairs.iter().enumerate() {
            if sender.send(item).is_err() {
                break;
            }
        }
        drop(sender);

        let results: Vec<(RunStats, Option<Error>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let receiver = receiver.clone();
                    scope.spawn(move || {
                        let mut local = RunStats::default();
                        for (idx, pair) in receiver.iter() {
                            if !self.is_running() {
                                break;
                            }
                            if let Err(e) = self.process_pair(idx, pairs.len(), pair, &mut local) {
                                self.aborted.store(true, Ordering::SeqCst);
                                return (local, Some(e));
                            }
                        }
                        (local, None)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut stats = RunStats::default();
        let mut first_error = None;
        for (local, error) in results {
            stats.merge(local);
            if let Some(e) = error {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    fn process_pair(
        &self,
        idx: usize,
        total: usize,
        pair: &FilePair,
        stats: &mut RunStats,
    ) -> Result<()> {
        info!("[{}/{}] Processing: {}", idx + 1, total, pair.key);

        for path in pair.paths() {
            if !self.is_running() {
                return Ok(());
            }

            // Records routed before a failure are already in the sinks, so
            // partial counts are kept either way.
            let mut file_stats = FileStats::default();
            let result = self.process_file_into(path, &mut file_stats);
            stats.absorb(&file_stats);

            match result {
                Ok(()) => {
                    if !file_stats.interrupted {
                        stats.files_processed += 1;
                        metrics::counter!("subsift_files_total").increment(1);
                    }
                }
                Err(e) => {
                    warn!("Error processing {}: {}", path.display(), e);
                    stats.files_failed += 1;
                    if e.is_framing() {
                        stats.framing_errors += 1;
                    }
                    metrics::counter!("subsift_files_failed_total").increment(1);
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Stream one archive through the pipeline.
    pub fn process_file(&self, path: &Path) -> Result<FileStats> {
        let mut stats = FileStats::default();
        self.process_file_into(path, &mut stats)?;
        Ok(stats)
    }

    /// Like [`Driver::process_file`], but `stats` keeps the partial counts
    /// when the file fails midway.
    pub fn process_file_into(&self, path: &Path, stats: &mut FileStats) -> Result<()> {
        let source = CompressedSource::open(path)?;
        let file_size = source.file_size();
        debug!("Streaming {} ({} bytes)", path.display(), file_size);

        let result = self.stream(
            source,
            path,
            Some(file_size),
            |decoder| decoder.get_ref().compressed_position(),
            stats,
        );

        record_bytes("compressed", stats.source_bytes);
        record_bytes("decompressed", stats.decoded_bytes);
        result
    }

    /// Stream an already-decompressed reader through the pipeline.
    ///
    /// Record offsets are decompressed byte positions. `label` names the
    /// stream in reports.
    pub fn process_reader<R: Read>(&self, reader: R, label: &Path) -> Result<FileStats> {
        let mut stats = FileStats::default();
        self.stream(reader, label, None, |decoder| decoder.bytes_read(), &mut stats)?;
        Ok(stats)
    }

    fn stream<R, P>(
        &self,
        reader: R,
        source: &Path,
        total_bytes: Option<u64>,
        position: P,
        stats: &mut FileStats,
    ) -> Result<()>
    where
        R: Read,
        P: Fn(&ChunkedTextDecoder<R>) -> u64,
    {
        let mut decoder = ChunkedTextDecoder::new(reader, self.config.decoder)?;
        let result = self.drain(&mut decoder, source, total_bytes, &position, stats);

        stats.source_bytes = position(&decoder);
        stats.decoded_bytes = decoder.bytes_read();

        metrics::counter!("subsift_records_total").increment(stats.records as u64);
        metrics::counter!("subsift_records_invalid_total").increment(stats.invalid as u64);

        let status = if result.is_ok() { "Finished" } else { "Abandoned" };
        info!(
            "{} {}: {} records, {} matched, {} invalid",
            status,
            source.display(),
            stats.records,
            stats.matched,
            stats.invalid
        );

        result
    }

    fn drain<R, P>(
        &self,
        decoder: &mut ChunkedTextDecoder<R>,
        source: &Path,
        total_bytes: Option<u64>,
        position: &P,
        stats: &mut FileStats,
    ) -> Result<()>
    where
        R: Read,
        P: Fn(&ChunkedTextDecoder<R>) -> u64,
    {
        let mut segmenter = LineSegmenter::new();

        'chunks: while let Some(chunk) = decoder.next_chunk()? {
            let offset = position(&*decoder);

            for record in segmenter.feed(&chunk, offset) {
                if !self.is_running() {
                    stats.interrupted = true;
                    break 'chunks;
                }
                let counted = self.route_record(&record, source, stats)?;

                if counted && stats.records.is_multiple_of(self.config.progress_interval) {
                    log_progress(source, stats, offset, total_bytes);
                }
            }
        }

        if !stats.interrupted
            && let Some(tail) = segmenter.finish()
        {
            if self.config.keep_unterminated_tail {
                self.route_record(&tail, source, stats)?;
            } else if !tail.text().is_empty() {
                debug!(
                    "Dropping unterminated final line of {} ({} bytes)",
                    source.display(),
                    tail.raw().len()
                );
                stats.dropped_tails += 1;
            }
        }

        Ok(())
    }

    /// Route one record, returning whether it counted as a record.
    fn route_record(&self, record: &Record, source: &Path, stats: &mut FileStats) -> Result<bool> {
        match self.router.route(record, source)? {
            RouteOutcome::Blank => {
                stats.blank += 1;
                return Ok(false);
            }
            RouteOutcome::Matched(_) => stats.matched += 1,
            RouteOutcome::Unmatched => stats.unmatched += 1,
            RouteOutcome::Skipped => stats.invalid += 1,
        }
        stats.records += 1;
        Ok(true)
    }
}

fn log_progress(source: &Path, stats: &FileStats, offset: u64, total_bytes: Option<u64>) {
    match total_bytes {
        Some(total) if total > 0 => info!(
            "{}: {} records, {} matched, {} invalid ({:.1}% of {} bytes)",
            source.display(),
            stats.records,
            stats.matched,
            stats.invalid,
            (offset as f64 / total as f64) * 100.0,
            total
        ),
        _ => info!(
            "{}: {} records, {} matched, {} invalid ({} bytes)",
            source.display(),
            stats.records,
            stats.matched,
            stats.invalid,
            offset
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;
    use std::fs;
    use std::path::PathBuf;
    use subsift_core::DecoderConfig;
    use tempfile::TempDir;

    struct Setup {
        tmp: TempDir,
        sinks: Arc<SinkSet>,
        reporter: Arc<CollectingReporter>,
        driver: Driver,
    }

    fn setup(config: ExtractConfig) -> Setup {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let config = ExtractConfig {
            output_template: out.join("{category}.json").display().to_string(),
            ..config
        };
        let sinks = Arc::new(SinkSet::open(&config.categories, |c| config.output_path(c)).unwrap());
        let reporter = Arc::new(CollectingReporter::new());
        let driver = Driver::new(config, sinks.clone(), reporter.clone()).unwrap();
        Setup {
            tmp,
            sinks,
            reporter,
            driver,
        }
    }

    fn small_config(categories: &[&str]) -> ExtractConfig {
        ExtractConfig {
            categories: categories.iter().map(|s| s.to_string()).collect(),
            decoder: DecoderConfig {
                chunk_size: 8,
                max_window: 64,
            },
            progress_interval: 2,
            ..Default::default()
        }
    }

    fn read_output(setup: &Setup, category: &str) -> String {
        fs::read_to_string(setup.tmp.path().join("out").join(format!("{category}.json"))).unwrap()
    }

    #[test]
    fn test_process_reader_routes_across_small_chunks() {
        let s = setup(small_config(&["AskUK"]));
        let input = "{\"subreddit\":\"AskUK\",\"title\":\"Café\"}\n{\"subreddit\":\"Other\"}\n";

        let stats = s.driver.process_reader(input.as_bytes(), Path::new("mem")).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.decoded_bytes, input.len() as u64);

        s.sinks.close_all().unwrap();
        assert_eq!(
            read_output(&s, "AskUK"),
            r#"[{"subreddit":"AskUK","title":"Café"}]"#
        );
    }

    #[test]
    fn test_unterminated_tail_dropped_by_default() {
        let s = setup(small_config(&["AskUK"]));
        let input = "{\"subreddit\":\"AskUK\",\"n\":1}\n{\"subreddit\":\"AskUK\",\"n\":2}";

        let stats = s.driver.process_reader(input.as_bytes(), Path::new("mem")).unwrap();
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.dropped_tails, 1);
    }

    #[test]
    fn test_unterminated_tail_kept_when_configured() {
        let s = setup(ExtractConfig {
            keep_unterminated_tail: true,
            ..small_config(&["AskUK"])
        });
        let input = "{\"subreddit\":\"AskUK\",\"n\":1}\n{\"subreddit\":\"AskUK\",\"n\":2}";

        let stats = s.driver.process_reader(input.as_bytes(), Path::new("mem")).unwrap();
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.dropped_tails, 0);
    }

    #[test]
    fn test_framing_error_aborts_stream() {
        let s = setup(small_config(&["AskUK"]));
        let mut input = b"{\"subreddit\":\"AskUK\"}\n".to_vec();
        input.extend_from_slice(b"{\"body\":\"\xFF\xFE\"}\n");

        let err = s.driver.process_reader(&input[..], Path::new("mem")).unwrap_err();
        assert!(err.is_framing());
    }

    #[test]
    fn test_failed_file_keeps_partial_stats() {
        let s = setup(small_config(&["AskUK"]));
        let mut input = b"{\"subreddit\":\"AskUK\",\"n\":1}\n".to_vec();
        input.extend_from_slice(&[b'x'; 40]);
        input.extend_from_slice(b"\xFF\xFF\n");
        let path = s.tmp.path().join("RC_2020-01.zst");
        fs::write(&path, zstd::encode_all(&input[..], 3).unwrap()).unwrap();

        let mut stats = FileStats::default();
        let err = s.driver.process_file_into(&path, &mut stats).unwrap_err();
        assert!(err.is_framing());
        assert_eq!(stats.records, 1);
        assert_eq!(stats.matched, 1);
        assert!(stats.decoded_bytes > 0);
        assert_eq!(s.sinks.get("AskUK").unwrap().written(), 1);
    }

    #[test]
    fn test_blank_records_do_not_count_toward_progress() {
        let s = setup(small_config(&["AskUK"]));
        let mut segmenter = LineSegmenter::new();
        let mut stats = FileStats::default();
        let counted: Vec<bool> = segmenter
            .feed("{\"subreddit\":\"AskUK\"}\n\n  \n{\"x\":1}\n", 0)
            .map(|record| {
                s.driver
                    .route_record(&record, Path::new("mem"), &mut stats)
                    .unwrap()
            })
            .collect();
        assert_eq!(counted, vec![true, false, false, true]);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.blank, 2);
    }

    #[test]
    fn test_blank_lines_not_counted_as_records() {
        let s = setup(small_config(&["AskUK"]));
        let stats = s
            .driver
            .process_reader("\n\n{\"subreddit\":\"AskUK\"}\n  \n".as_bytes(), Path::new("mem"))
            .unwrap();
        assert_eq!(stats.blank, 3);
        assert_eq!(stats.records, 1);
        assert!(s.reporter.is_empty());
    }

    #[test]
    fn test_shutdown_flag_stops_stream() {
        let running = Arc::new(AtomicBool::new(false));
        let s = setup(small_config(&["AskUK"]));
        let Setup { driver, .. } = s;
        let driver = driver.with_shutdown_flag(running);

        let stats = driver
            .process_reader("{\"subreddit\":\"AskUK\"}\n".as_bytes(), Path::new("mem"))
            .unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.records, 0);
    }

    #[test]
    fn test_run_isolates_missing_file() {
        let s = setup(small_config(&["AskUK"]));
        let good = s.tmp.path().join("RS_2020-01.zst");
        fs::write(
            &good,
            zstd::encode_all(&b"{\"subreddit\":\"AskUK\"}\n"[..], 3).unwrap(),
        )
        .unwrap();

        let pair = FilePair {
            key: "2020-01.zst".to_string(),
            first: PathBuf::from("/nonexistent/RC_2020-01.zst"),
            second: good,
        };
        let stats = s.driver.run(&[pair]).unwrap();
        assert_eq!(stats.pairs, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.framing_errors, 0);
        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_run_aborts_when_not_continuing() {
        let s = setup(ExtractConfig {
            continue_on_error: false,
            ..small_config(&["AskUK"])
        });
        let pair = FilePair {
            key: "x".to_string(),
            first: PathBuf::from("/nonexistent/RC_x.zst"),
            second: PathBuf::from("/nonexistent/RS_x.zst"),
        };
        assert!(s.driver.run(&[pair]).is_err());
    }

    #[test]
    fn test_run_stats_merge() {
        let mut a = RunStats {
            files_processed: 1,
            matched: 2,
            ..Default::default()
        };
        a.merge(RunStats {
            files_processed: 3,
            matched: 4,
            interrupted: true,
            ..Default::default()
        });
        assert_eq!(a.files_processed, 4);
        assert_eq!(a.matched, 6);
        assert!(a.interrupted);
    }
}
