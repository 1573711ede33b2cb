//! Duplicate label detection.

use crate::error::{AlignError, Result};
use indexmap::IndexMap;

/// Every label occurring more than once, with its count, in first-seen order.
pub fn duplicate_counts<S: AsRef<str>>(labels: &[S]) -> Vec<(String, usize)> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for label in labels {
        *counts.entry(label.as_ref()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(label, n)| (label.to_string(), n))
        .collect()
}

/// Fail with [`AlignError::DuplicateLabel`] if any label repeats.
///
/// The error enumerates every duplicated label, not just the first one found.
pub fn validate_unique<S: AsRef<str>>(labels: &[S]) -> Result<()> {
    let duplicates = duplicate_counts(labels);
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(AlignError::DuplicateLabel { duplicates })
    }
}
