//! File-pair discovery and sampling.
//!
//! The corpus lives in two parallel trees (e.g. `comments/RC_2019-01.zst` and
//! `submissions/RS_2019-01.zst`). Files are paired when their names agree after
//! a fixed-length prefix, and a random subset of pairs is drawn for processing.

use crate::error::{Error, Result};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use subsift_core::Codec;

/// Two archives, one per source tree, sharing a filename suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    /// Shared suffix (e.g. `2019-01.zst`).
    pub key: String,

    /// File from the first tree.
    pub first: PathBuf,

    /// File from the second tree.
    pub second: PathBuf,
}

impl FilePair {
    /// Both files, first tree first.
    pub fn paths(&self) -> [&Path; 2] {
        [&self.first, &self.second]
    }
}

/// Sorted names of the compressed archives directly inside `dir`.
pub fn list_archives(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Source directory does not exist: {}", dir.display()),
        )));
    }

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let path = e.path();
            path.is_file() && Codec::from_path(&path).is_compressed()
        })
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    // Sort for deterministic pairing
    names.sort();
    Ok(names)
}

/// Pairing suffix of `name`, if it is longer than the prefix.
fn suffix(name: &str, prefix_len: usize) -> Option<&str> {
    name.get(prefix_len..).filter(|rest| !rest.is_empty())
}

/// Match names across the two trees by suffix.
///
/// Each name in `first` pairs with the first name in `second` that has the
/// same suffix; names with no partner are dropped.
pub fn match_names(first: &[String], second: &[String], prefix_len: usize) -> Vec<(String, String)> {
    let mut by_suffix: HashMap<&str, &String> = HashMap::new();
    for name in second {
        if let Some(key) = suffix(name, prefix_len) {
            by_suffix.entry(key).or_insert(name);
        }
    }

    first
        .iter()
        .filter_map(|name| {
            let key = suffix(name, prefix_len)?;
            by_suffix
                .get(key)
                .map(|partner| (name.clone(), (*partner).clone()))
        })
        .collect()
}

/// Discover every file pair across the two source trees.
pub fn pair_files(dirs: &[PathBuf; 2], prefix_len: usize) -> Result<Vec<FilePair>> {
    let first = list_archives(&dirs[0])?;
    let second = list_archives(&dirs[1])?;

    tracing::info!(
        "Found {} archives in {} and {} in {}",
        first.len(),
        dirs[0].display(),
        second.len(),
        dirs[1].display()
    );

    let pairs: Vec<FilePair> = match_names(&first, &second, prefix_len)
        .into_iter()
        .map(|(a, b)| FilePair {
            key: a[prefix_len..].to_string(),
            first: dirs[0].join(&a),
            second: dirs[1].join(&b),
        })
        .collect();

    let unpaired = first.len() - pairs.len();
    if unpaired > 0 {
        tracing::warn!("{} archives in {} have no partner", unpaired, dirs[0].display());
    }

    Ok(pairs)
}

/// Number of pairs drawn for `fraction` of `total`, rounded up.
pub fn sample_size(total: usize, fraction: f64) -> usize {
    // Absorb float noise such as 0.1 * 30 = 3.0000000000000004.
    let exact = fraction * total as f64 - 1e-9;
    exact.ceil().max(0.0) as usize
}

/// Draw `ceil(fraction * len)` pairs.
///
/// With replacement the same pair may be drawn more than once and the result
/// may repeat entries; without replacement every drawn pair is distinct.
pub fn sample_pairs<R: Rng + ?Sized>(
    pairs: &[FilePair],
    fraction: f64,
    with_replacement: bool,
    rng: &mut R,
) -> Vec<FilePair> {
    let k = sample_size(pairs.len(), fraction);

    if with_replacement {
        (0..k).filter_map(|_| pairs.choose(rng).cloned()).collect()
    } else {
        pairs.choose_multiple(rng, k).cloned().collect()
    }
}
