//! Extraction run configuration.

use crate::error::{Error, Result};
use std::path::PathBuf;
use subsift_core::DecoderConfig;

/// Placeholder replaced by the category name in the output template.
pub const CATEGORY_PLACEHOLDER: &str = "{category}";

/// Communities extracted when no category list is given.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "AskHistorians",
    "AskAcademia",
    "AskEngineers",
    "AskCulinary",
    "AskPhotography",
    "AskMen",
    "AskWomen",
    "AskMenOver30",
    "AskWomenOver30",
    "AskOldPeople",
    "AskEurope",
    "AskUK",
    "AskNYC",
    "AskFrance",
    "askSingapore",
    "AskArgentina",
];

/// Configuration for an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// The two source trees whose files are paired (comments, submissions).
    pub source_dirs: [PathBuf; 2],

    /// Category names matched against the discriminator field.
    pub categories: Vec<String>,

    /// Discriminator field name.
    pub field: String,

    /// Output path with a `{category}` placeholder.
    pub output_template: String,

    /// Chunk size and window ceiling for decoding.
    pub decoder: DecoderConfig,

    /// Fraction of pairs to sample, in (0, 1].
    pub sample_fraction: f64,

    /// Sample pairs with replacement (duplicates possible).
    pub with_replacement: bool,

    /// Seed for the pair sampler.
    pub seed: Option<u64>,

    /// Filename characters before the pairing suffix (e.g. `RC_`).
    pub prefix_len: usize,

    /// Keep going after a file fails to decode.
    pub continue_on_error: bool,

    /// Route the final line of a file even when it has no trailing newline.
    pub keep_unterminated_tail: bool,

    /// Worker threads processing pairs.
    pub jobs: usize,

    /// Log progress every N records within a file.
    pub progress_interval: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            source_dirs: [
                PathBuf::from("reddit/comments"),
                PathBuf::from("reddit/submissions"),
            ],
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            field: "subreddit".to_string(),
            output_template: "ask_data/{category}.json".to_string(),
            decoder: DecoderConfig::default(),
            sample_fraction: 0.45,
            with_replacement: true,
            seed: None,
            prefix_len: 3,
            continue_on_error: true,
            keep_unterminated_tail: false,
            jobs: 1,
            progress_interval: 1_000_000,
        }
    }
}

impl ExtractConfig {
    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(Error::Config("at least one category is required".to_string()));
        }
        if self.categories.iter().any(|c| c.is_empty()) {
            return Err(Error::Config("category names must be non-empty".to_string()));
        }
        if self.field.is_empty() {
            return Err(Error::Config("discriminator field must be non-empty".to_string()));
        }
        if !self.output_template.contains(CATEGORY_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "output template '{}' must contain {}",
                self.output_template, CATEGORY_PLACEHOLDER
            )));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "sample fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        if self.jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }
        if self.progress_interval == 0 {
            return Err(Error::Config("progress interval must be at least 1".to_string()));
        }
        self.decoder.validate()?;
        Ok(())
    }

    /// Output file for `category`.
    pub fn output_path(&self, category: &str) -> PathBuf {
        PathBuf::from(self.output_template.replace(CATEGORY_PLACEHOLDER, category))
    }
}
