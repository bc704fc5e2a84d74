//! Extract per-category JSON arrays from a random sample of paired dumps.
//!
//! Reads zstd-compressed newline-delimited JSON from two parallel source
//! trees (e.g. comments and submissions), pairs files by the part of their
//! name after a fixed prefix, samples a fraction of the pairs, and writes
//! every record whose discriminator field names a configured category to
//! that category's JSON array file.
//!
//! # Pipeline
//!
//! ```text
//! [RC_*.zst / RS_*.zst] → [Pair + Sample] → [Decode] → [Segment] → [Route] → ask_data/*.json
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Default sixteen "Ask" communities, 45% of pairs with replacement
//! subsift --comments-dir /data/reddit/comments --submissions-dir /data/reddit/submissions
//!
//! # Two categories, reproducible sample, four workers
//! subsift --comments-dir ./rc --submissions-dir ./rs \
//!     --categories AskUK,AskNYC --seed 7 --jobs 4 \
//!     --output-template './out/{category}.json'
//! ```
//!
//! # Shutdown
//!
//! Ctrl+C or SIGTERM stops the workers at the next record and still writes
//! the closing `]` of every output file. A process killed outright (SIGKILL,
//! power loss) leaves the output arrays unterminated.

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use subsift_core::DecoderConfig;
use subsift_core::metrics::{init_metrics, start_metrics_server};
use subsift_extract::{Driver, ExtractConfig, LogReporter, RunStats, SinkSet, SinkSummary};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Extract category subsets from paired compressed JSONL dumps.
#[derive(Parser, Debug)]
#[command(name = "subsift")]
#[command(about = "Sample paired compressed JSONL dumps into per-category JSON arrays")]
#[command(version)]
struct Args {
    /// First source tree (e.g. comments, files named RC_YYYY-MM.zst)
    #[arg(long, default_value = "reddit/comments")]
    comments_dir: PathBuf,

    /// Second source tree (e.g. submissions, files named RS_YYYY-MM.zst)
    #[arg(long, default_value = "reddit/submissions")]
    submissions_dir: PathBuf,

    /// Categories to extract (comma-separated, overrides defaults)
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    /// Discriminator field compared against the category names
    #[arg(long, default_value = "subreddit")]
    field: String,

    /// Output path; {category} is replaced by the category name
    #[arg(long, default_value = "ask_data/{category}.json")]
    output_template: String,

    /// Bytes read from the decompressor per chunk
    #[arg(long, default_value = "134217728")] // 128 MiB
    chunk_size: usize,

    /// Maximum bytes held while resolving a chunk split mid-character
    #[arg(long, default_value = "1073741824")] // 1 GiB
    max_window: usize,

    /// Fraction of file pairs to sample, in (0, 1]
    #[arg(long, default_value = "0.45")]
    sample_fraction: f64,

    /// Sample distinct pairs instead of drawing with replacement
    #[arg(long)]
    without_replacement: bool,

    /// Seed for the pair sampler (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Filename characters before the suffix used to pair files
    #[arg(long, default_value = "3")]
    prefix_len: usize,

    /// Skip files that fail to decode instead of aborting the run
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    continue_on_error: bool,

    /// Route a file's final line even when it lacks a trailing newline
    #[arg(long)]
    keep_unterminated_tail: bool,

    /// Worker threads processing pairs
    #[arg(long, default_value = "1")]
    jobs: usize,

    /// Log progress every N records within a file
    #[arg(long, default_value = "1000000")]
    progress_interval: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

impl Args {
    fn to_config(&self) -> ExtractConfig {
        let defaults = ExtractConfig::default();
        ExtractConfig {
            source_dirs: [self.comments_dir.clone(), self.submissions_dir.clone()],
            categories: self.categories.clone().unwrap_or(defaults.categories),
            field: self.field.clone(),
            output_template: self.output_template.clone(),
            decoder: DecoderConfig {
                chunk_size: self.chunk_size,
                max_window: self.max_window,
            },
            sample_fraction: self.sample_fraction,
            with_replacement: !self.without_replacement,
            seed: self.seed,
            prefix_len: self.prefix_len,
            continue_on_error: self.continue_on_error,
            keep_unterminated_tail: self.keep_unterminated_tail,
            jobs: self.jobs,
            progress_interval: self.progress_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate().context("Invalid configuration")?;

    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }
    gauge!("subsift_running").set(1.0);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Shutdown signal received, closing output files...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    log_config(&config);

    let sinks = Arc::new(
        SinkSet::open(&config.categories, |c| config.output_path(c))
            .context("Failed to open category sinks")?,
    );

    let driver = Driver::new(config, Arc::clone(&sinks), Arc::new(LogReporter))?
        .with_shutdown_flag(running);

    let start = Instant::now();
    let result = extract(&driver);

    // Close sinks on every path so the arrays stay well-formed.
    let closed = sinks.close_all().context("Failed to close category sinks");
    gauge!("subsift_running").set(0.0);

    let stats = result?;
    let summaries = closed?;
    let elapsed = start.elapsed();

    if stats.interrupted {
        warn!("Run interrupted; output contains a partial sample");
    }

    print_summary(&args, &stats, &summaries, elapsed);

    Ok(())
}

fn extract(driver: &Driver) -> Result<RunStats> {
    let pairs = driver.discover_pairs().context("Failed to pair source files")?;
    info!("Found {} file pairs", pairs.len());

    let sample = driver.sample(&pairs);
    let stats = driver.run(&sample)?;
    Ok(stats)
}

fn log_config(config: &ExtractConfig) {
    info!("Configuration:");
    info!("  Sources: {} | {}", config.source_dirs[0].display(), config.source_dirs[1].display());
    info!("  Categories: {}", config.categories.join(", "));
    info!("  Field: {}", config.field);
    info!("  Output: {}", config.output_template);
    info!(
        "  Chunk size: {} bytes, max window: {} bytes",
        config.decoder.chunk_size, config.decoder.max_window
    );
    info!(
        "  Sample: {:.0}% {} replacement",
        config.sample_fraction * 100.0,
        if config.with_replacement { "with" } else { "without" }
    );
    info!("  Jobs: {}", config.jobs);
}

fn print_summary(args: &Args, stats: &RunStats, sinks: &[SinkSummary], elapsed: Duration) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Comments:     {}", args.comments_dir.display());
    println!("Submissions:  {}", args.submissions_dir.display());
    println!("Output:       {}", args.output_template);
    println!();
    println!("Pairs sampled:     {:>12}", stats.pairs);
    println!("Files processed:   {:>12}", stats.files_processed);
    println!("Files failed:      {:>12}", stats.files_failed);
    if stats.framing_errors > 0 {
        println!("  - Framing:         {:>10}", stats.framing_errors);
    }
    println!("Records:           {:>12}", stats.records);
    println!("Matched:           {:>12}", stats.matched);
    println!("Unmatched:         {:>12}", stats.unmatched);
    println!("Invalid:           {:>12}", stats.invalid);
    println!("Blank lines:       {:>12}", stats.blank);
    if stats.dropped_tails > 0 {
        println!("Dropped tails:     {:>12}", stats.dropped_tails);
    }
    println!();
    println!("╭─────────────────────────────────────────────────────────────────╮");
    println!("│ CATEGORIES                                                      │");
    println!("├─────────────────────────────────────────────────────────────────┤");
    for sink in sinks {
        println!("│ {:<30} {:>15} records                │", sink.category, sink.records);
    }
    println!("╰─────────────────────────────────────────────────────────────────╯");
    println!();
    println!("Compressed input:  {:>12} bytes", stats.source_bytes);
    println!("Decompressed:      {:>12} bytes", stats.decoded_bytes);
    println!("Elapsed time:      {:>12.2?}", elapsed);

    if stats.records > 0 && elapsed.as_secs_f64() > 0.0 {
        let records_per_sec = stats.records as f64 / elapsed.as_secs_f64();
        println!("Throughput:        {:>12.0} records/sec", records_per_sec);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["subsift"]);
        let config = args.to_config();
        assert_eq!(config.categories.len(), 16);
        assert_eq!(config.decoder.chunk_size, 1 << 27);
        assert_eq!(config.decoder.max_window, 1 << 30);
        assert!(config.with_replacement);
        assert!(config.continue_on_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "subsift",
            "--categories",
            "AskUK,AskNYC",
            "--without-replacement",
            "--continue-on-error",
            "false",
            "--seed",
            "9",
            "--jobs",
            "4",
        ]);
        let config = args.to_config();
        assert_eq!(config.categories, vec!["AskUK", "AskNYC"]);
        assert!(!config.with_replacement);
        assert!(!config.continue_on_error);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let args = Args::parse_from(["subsift"]);
        let stats = RunStats {
            pairs: 4,
            files_processed: 7,
            files_failed: 1,
            framing_errors: 1,
            records: 1000,
            matched: 10,
            unmatched: 980,
            invalid: 10,
            ..Default::default()
        };
        let sinks = vec![SinkSummary {
            category: "AskUK".to_string(),
            path: PathBuf::from("ask_data/AskUK.json"),
            records: 10,
        }];
        print_summary(&args, &stats, &sinks, Duration::from_secs(2));
        print_summary(&args, &RunStats::default(), &[], Duration::from_secs(0));
    }
}
