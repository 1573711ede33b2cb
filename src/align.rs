//! Set reconciliation between manifest specimens and counts columns.
//!
//! After the identifier reconciler has renamed the counts headers, the
//! aligner decides what to do about manifest specimens that still have no
//! column, then reindexes the counts so its columns follow the manifest order
//! exactly.

use crate::data::{CountMatrix, Manifest};
use crate::error::{AlignError, Result};
use crate::ident::{IdentifierMap, Reconciler};
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What to do with manifest specimens absent from the counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignPolicy {
    /// Any missing specimen is an error.
    #[default]
    Strict,
    /// Missing specimens are reported and dropped from the manifest.
    Lenient,
}

/// Manifest and counts sharing one specimen order.
#[derive(Debug, Clone)]
pub struct AlignedTables {
    pub manifest: Manifest,
    pub counts: CountMatrix,
}

/// Paths written by [`AlignedTables::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub counts: PathBuf,
    pub manifest: PathBuf,
}

impl AlignedTables {
    /// Write `counts.csv` and `validated.<manifest_stem>.csv` into `dir`.
    pub fn write<P: AsRef<Path>>(&self, dir: P, manifest_stem: &str) -> Result<Snapshot> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let snapshot = Snapshot {
            counts: dir.join("counts.csv"),
            manifest: dir.join(format!("validated.{}.csv", manifest_stem)),
        };
        self.counts.to_csv(&snapshot.counts)?;
        self.manifest.to_csv(&snapshot.manifest)?;
        Ok(snapshot)
    }
}

/// Manifest identifiers with no counts column, in manifest order.
pub fn missing_specimens(manifest: &Manifest, counts: &CountMatrix) -> Vec<String> {
    let columns: HashSet<&str> = counts.sample_ids().iter().map(String::as_str).collect();
    manifest
        .sample_ids()
        .iter()
        .filter(|id| !columns.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Align a manifest with counts whose headers are already reconciled.
///
/// Columns not in the manifest are dropped without comment. On success the
/// counts columns equal the manifest identifiers, element for element.
pub fn align(
    manifest: &Manifest,
    counts: &CountMatrix,
    policy: AlignPolicy,
    reporter: &dyn Reporter,
) -> Result<AlignedTables> {
    let missing = missing_specimens(manifest, counts);

    let manifest = if missing.is_empty() {
        manifest.clone()
    } else {
        match policy {
            AlignPolicy::Strict => return Err(AlignError::MissingSpecimens(missing)),
            AlignPolicy::Lenient => {
                reporter.warn(&format!(
                    "Dropping {} specimens missing from counts: {}",
                    missing.len(),
                    missing.join(", ")
                ));
                let kept = manifest.drop_samples(&missing);
                if kept.n_samples() == 0 {
                    return Err(AlignError::NoOverlap);
                }
                kept
            }
        }
    };

    let dropped_columns = counts.n_samples().saturating_sub(manifest.n_samples());
    if dropped_columns > 0 {
        reporter.info(&format!(
            "Dropping {} counts columns not in the manifest",
            dropped_columns
        ));
    }

    let counts = counts.reindex_samples(manifest.sample_ids())?;
    Ok(AlignedTables { manifest, counts })
}

/// Reconcile the counts headers against the manifest, then align.
pub fn reconcile_and_align(
    manifest: &Manifest,
    counts: &CountMatrix,
    reconciler: &Reconciler,
    policy: AlignPolicy,
    reporter: &dyn Reporter,
) -> Result<(IdentifierMap, AlignedTables)> {
    let map = reconciler.reconcile(manifest.sample_ids(), counts.sample_ids(), reporter)?;
    let renamed = counts.with_sample_ids(map.resolved_labels())?;
    let aligned = align(manifest, &renamed, policy, reporter)?;
    Ok((map, aligned))
}
