//! Query engine over the dataset files.
//!
//! Linear scans: the files are a few hundred rows each and are re-read on
//! every query so edits to the data show up without a restart.

use super::{read_rows, Row};
use crate::error::Result;
use rand::seq::SliceRandom;
use std::path::Path;

/// Rows whose `column` value case-insensitively contains `needle`, in
/// source order. Rows lacking the column never match.
///
/// Lowercasing is Unicode-aware: dataset values carry accented Portuguese
/// and a search for "dipirona" must match "DIPIRONA SÓDICA".
pub fn filter_by(path: &Path, column: &str, needle: &str) -> Result<Vec<Row>> {
    let needle = needle.to_lowercase();
    let mut matches = Vec::new();

    for row in read_rows(path)? {
        let row = row?;
        if let Some(value) = row.get(column) {
            if value.to_lowercase().contains(&needle) {
                matches.push(row);
            }
        }
    }

    Ok(matches)
}

/// Every row of the dataset, in source order ("list everything" mode).
pub fn all_rows(path: &Path) -> Result<Vec<Row>> {
    read_rows(path)?.collect()
}

/// `min(k, n)` distinct rows drawn uniformly without replacement.
///
/// An empty dataset yields an empty vec - callers distinguish that from a
/// failed read.
pub fn sample(path: &Path, k: usize) -> Result<Vec<Row>> {
    let mut rows = all_rows(path)?;
    let mut rng = rand::thread_rng();
    let take = k.min(rows.len());
    // Fisher-Yates prefix: only `take` positions are shuffled.
    let (picked, _rest) = rows.partial_shuffle(&mut rng, take);
    Ok(picked.to_vec())
}
