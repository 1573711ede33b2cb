//! Log counts-per-million scaling.
//!
//! Each count is divided by its specimen's library size, multiplied by a
//! scale factor (1e6 for CPM) and passed through `ln(1 + x)`. This is the
//! representation handed to embedding and visualization tools.

use crate::data::CountMatrix;
use crate::error::{AlignError, Result};
use crate::io::write_table;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default multiplier: counts per million.
pub const CPM: f64 = 1e6;

/// Result of log-CPM scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogCpmMatrix {
    /// The scaled data (features × specimens).
    #[serde(skip)]
    pub data: DMatrix<f64>,
    /// Feature identifiers.
    pub feature_ids: Vec<String>,
    /// Specimen identifiers.
    pub sample_ids: Vec<String>,
    /// Scale factor applied before the log.
    pub scale_factor: f64,
    /// Library sizes (column sums before scaling).
    pub library_sizes: Vec<f64>,
}

impl LogCpmMatrix {
    /// Get the scaled value for a feature and specimen.
    pub fn get(&self, feature: usize, sample: usize) -> f64 {
        self.data[(feature, sample)]
    }

    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Get a column (specimen) as a vector.
    pub fn col(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().cloned().collect()
    }

    /// Get reference to the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Mean scaled abundance of each feature across specimens, skipping
    /// missing cells.
    pub fn feature_means(&self) -> Vec<f64> {
        (0..self.n_features())
            .map(|i| {
                let present: Vec<f64> = self
                    .data
                    .row(i)
                    .iter()
                    .copied()
                    .filter(|v| !v.is_nan())
                    .collect();
                if present.is_empty() {
                    f64::NAN
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            })
            .collect()
    }

    /// Write as CSV, features as rows.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let header: Vec<String> = std::iter::once("gene_id".to_string())
            .chain(self.sample_ids.iter().cloned())
            .collect();
        let rows: Vec<Vec<String>> = self
            .feature_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                std::iter::once(id.clone())
                    .chain(self.data.row(i).iter().map(|v| {
                        if v.is_nan() {
                            String::new()
                        } else {
                            v.to_string()
                        }
                    }))
                    .collect()
            })
            .collect();
        write_table(path, &header, &rows)
    }
}

/// Scale counts to `ln(1 + scale_factor * x / library_size)`.
///
/// # Arguments
/// * `counts` - Aligned count matrix
/// * `scale_factor` - Multiplier applied to proportions ([`CPM`] for counts per million)
///
/// A specimen whose counts sum to zero cannot be scaled and is a
/// [`AlignError::Numerical`] error.
pub fn norm_log_cpm(counts: &CountMatrix, scale_factor: f64) -> Result<LogCpmMatrix> {
    let n_features = counts.n_features();
    let n_samples = counts.n_samples();

    if n_features == 0 || n_samples == 0 {
        return Err(AlignError::EmptyData(
            "Cannot scale an empty matrix".to_string(),
        ));
    }

    if scale_factor.is_nan() || scale_factor <= 0.0 {
        return Err(AlignError::Numerical(
            "Scale factor must be positive".to_string(),
        ));
    }

    let library_sizes = counts.col_sums();
    for (j, &lib_size) in library_sizes.iter().enumerate() {
        if lib_size == 0.0 {
            return Err(AlignError::Numerical(format!(
                "Specimen {} has zero total counts, cannot normalize",
                counts.sample_ids()[j]
            )));
        }
    }

    let scaled_cols: Vec<Vec<f64>> = (0..n_samples)
        .into_par_iter()
        .map(|j| {
            let lib_size = library_sizes[j];
            counts
                .col_dense(j)
                .into_iter()
                .map(|x| (scale_factor * x / lib_size).ln_1p())
                .collect()
        })
        .collect();

    let data = DMatrix::from_fn(n_features, n_samples, |i, j| scaled_cols[j][i]);

    Ok(LogCpmMatrix {
        data,
        feature_ids: counts.feature_ids().to_vec(),
        sample_ids: counts.sample_ids().to_vec(),
        scale_factor,
        library_sizes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn create_test_counts() -> CountMatrix {
        let mut tri_mat = TriMat::new((3, 2));
        tri_mat.add_triplet(0, 0, 30.0);
        tri_mat.add_triplet(1, 0, 70.0);
        tri_mat.add_triplet(0, 1, 10.0);
        tri_mat.add_triplet(1, 1, 10.0);
        tri_mat.add_triplet(2, 1, f64::NAN);

        CountMatrix::new(
            tri_mat.to_csr(),
            "gene_id".to_string(),
            vec!["g1".to_string(), "g2".to_string(), "g3".to_string()],
            vec!["S1".to_string(), "S2".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_log_cpm_values() {
        let counts = create_test_counts();
        let scaled = norm_log_cpm(&counts, 100.0).unwrap();

        assert_eq!(scaled.library_sizes, vec![100.0, 20.0]);
        assert!((scaled.get(0, 0) - 31f64.ln()).abs() < 1e-12);
        assert!((scaled.get(1, 0) - 71f64.ln()).abs() < 1e-12);
        assert_eq!(scaled.get(2, 0), 0.0);
        assert!((scaled.get(0, 1) - 51f64.ln()).abs() < 1e-12);
        assert!(scaled.get(2, 1).is_nan());
    }

    #[test]
    fn test_feature_means_skip_missing() {
        let counts = create_test_counts();
        let scaled = norm_log_cpm(&counts, 100.0).unwrap();
        let means = scaled.feature_means();
        assert!((means[0] - (31f64.ln() + 51f64.ln()) / 2.0).abs() < 1e-12);
        assert_eq!(means[2], 0.0);
    }

    #[test]
    fn test_zero_library_rejected() {
        let mut tri_mat = TriMat::new((1, 2));
        tri_mat.add_triplet(0, 0, 5.0);
        let counts = CountMatrix::new(
            tri_mat.to_csr(),
            "gene_id".to_string(),
            vec!["g1".to_string()],
            vec!["S1".to_string(), "empty".to_string()],
        )
        .unwrap();

        match norm_log_cpm(&counts, CPM) {
            Err(AlignError::Numerical(msg)) => assert!(msg.contains("empty")),
            other => panic!("expected Numerical, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_scale_factor() {
        let counts = create_test_counts();
        assert!(norm_log_cpm(&counts, 0.0).is_err());
        assert!(norm_log_cpm(&counts, f64::NAN).is_err());
    }

    #[test]
    fn test_to_csv() {
        let counts = create_test_counts();
        let scaled = norm_log_cpm(&counts, 100.0).unwrap();
        let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        scaled.to_csv(out.path()).unwrap();

        let table = crate::io::read_table(out.path()).unwrap();
        assert_eq!(table.header, vec!["gene_id", "S1", "S2"]);
        assert_eq!(table.rows[2], vec!["g3", "0", ""]);
    }
}
