//! Feature-by-specimen count matrix with sparse storage.

use crate::error::{AlignError, Result};
use crate::ident::validate_unique;
use crate::io::{read_table, write_table, DelimitedTable};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::path::Path;

/// Column layout of a counts file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountsLayout {
    /// Feature identifier column followed by one column per specimen.
    #[default]
    Plain,
    /// `salmon.merged.gene_counts.tsv` from nf-core/rnaseq: `gene_id`,
    /// `gene_name`, then one column per specimen.
    #[serde(alias = "salmon")]
    SalmonMergedGeneCounts,
}

/// A sparse count matrix storing feature abundances across specimens.
///
/// Rows represent features (genes), columns represent specimens. Missing
/// cells are stored explicitly as `NaN` so they survive a round trip.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (features × specimens)
    data: CsMat<f64>,
    /// Header of the feature identifier column
    index_name: String,
    /// Feature identifiers (row names)
    feature_ids: Vec<String>,
    /// Specimen identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(
        data: CsMat<f64>,
        index_name: String,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != feature_ids.len() || ncols != sample_ids.len() {
            return Err(AlignError::EmptyData(format!(
                "matrix is {} x {} but has {} feature and {} specimen labels",
                nrows,
                ncols,
                feature_ids.len(),
                sample_ids.len()
            )));
        }
        Ok(Self {
            data,
            index_name,
            feature_ids,
            sample_ids,
        })
    }

    /// Build from a raw table in the given layout.
    ///
    /// Specimen labels are returned as written; checking them is the
    /// reconciler's job.
    pub fn from_table(table: DelimitedTable, layout: CountsLayout) -> Result<Self> {
        let skip = match layout {
            CountsLayout::Plain => 1,
            CountsLayout::SalmonMergedGeneCounts => {
                for (i, expected) in ["gene_id", "gene_name"].iter().enumerate() {
                    if table.header.get(i).map(String::as_str) != Some(*expected) {
                        return Err(AlignError::MissingColumn(expected.to_string()));
                    }
                }
                2
            }
        };

        if table.n_columns() <= skip {
            return Err(AlignError::EmptyData(
                "Counts table must have at least one specimen".to_string(),
            ));
        }
        let index_name = table.header[0].clone();
        let sample_ids: Vec<String> = table.header[skip..].to_vec();
        let n_samples = sample_ids.len();

        let mut tri_mat = TriMat::new((table.n_rows(), n_samples));
        let mut feature_ids = Vec::with_capacity(table.n_rows());

        for (row_idx, record) in table.rows.iter().enumerate() {
            feature_ids.push(record[0].clone());
            for (col_idx, raw) in record[skip..].iter().take(n_samples).enumerate() {
                let raw = raw.trim();
                let value = if raw.is_empty() || raw == "NA" || raw == "NaN" {
                    f64::NAN
                } else {
                    raw.parse::<f64>().map_err(|_| AlignError::InvalidValue {
                        value: raw.to_string(),
                        row: row_idx,
                        col: col_idx,
                    })?
                };
                if value != 0.0 {
                    tri_mat.add_triplet(row_idx, col_idx, value);
                }
            }
        }

        if feature_ids.is_empty() {
            return Err(AlignError::EmptyData("No features in counts table".to_string()));
        }
        if layout == CountsLayout::SalmonMergedGeneCounts {
            validate_unique(&feature_ids)?;
        }

        Self::new(tri_mat.to_csr(), index_name, feature_ids, sample_ids)
    }

    /// Load a counts table from a CSV or TSV file (optionally gzip-compressed).
    pub fn from_path<P: AsRef<Path>>(path: P, layout: CountsLayout) -> Result<Self> {
        Self::from_table(read_table(path)?, layout)
    }

    /// Write as CSV, feature identifiers first.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let header: Vec<String> = std::iter::once(self.index_name.clone())
            .chain(self.sample_ids.iter().cloned())
            .collect();
        let rows: Vec<Vec<String>> = (0..self.n_features())
            .map(|row| {
                std::iter::once(self.feature_ids[row].clone())
                    .chain((0..self.n_samples()).map(|col| format_value(self.get(row, col))))
                    .collect()
            })
            .collect();
        write_table(path, &header, &rows)
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.rows()
    }

    /// Number of specimens (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Header of the feature identifier column.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Specimen identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Get a dense vector for a specific column (specimen).
    pub fn col_dense(&self, col: usize) -> Vec<f64> {
        (0..self.n_features())
            .map(|row| self.get(row, col))
            .collect()
    }

    /// Column sums (library sizes per specimen), ignoring missing cells.
    pub fn col_sums(&self) -> Vec<f64> {
        (0..self.n_samples())
            .into_par_iter()
            .map(|col| self.col_dense(col).into_iter().filter(|v| !v.is_nan()).sum())
            .collect()
    }

    /// Copy with the specimen labels replaced, e.g. by reconciled identifiers.
    pub fn with_sample_ids(&self, sample_ids: Vec<String>) -> Result<Self> {
        Self::new(
            self.data.clone(),
            self.index_name.clone(),
            self.feature_ids.clone(),
            sample_ids,
        )
    }

    /// Subset the matrix to include only specified specimens (by index).
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let n_features = self.n_features();
        let n_samples = indices.len();

        let mut new_sample_ids = Vec::with_capacity(n_samples);
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(AlignError::EmptyData(format!(
                    "Specimen index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        // An old column may be requested more than once
        let mut col_map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (new_idx, &old_idx) in indices.iter().enumerate() {
            col_map.entry(old_idx).or_default().push(new_idx);
        }

        let mut tri_mat = TriMat::new((n_features, n_samples));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(new_cols) = col_map.get(&old_col) {
                    for &new_col in new_cols {
                        tri_mat.add_triplet(row, new_col, val);
                    }
                }
            }
        }

        Self::new(
            tri_mat.to_csr(),
            self.index_name.clone(),
            self.feature_ids.clone(),
            new_sample_ids,
        )
    }

    /// Reindex the columns to exactly `sample_ids`, in that order.
    ///
    /// Columns not listed are dropped; a listed identifier with no column is a
    /// [`AlignError::MissingSpecimens`] error.
    pub fn reindex_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let position: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut indices = Vec::with_capacity(sample_ids.len());
        let mut missing = Vec::new();
        for id in sample_ids {
            match position.get(id.as_str()) {
                Some(&i) => indices.push(i),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(AlignError::MissingSpecimens(missing));
        }

        self.subset_samples(&indices)
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_matrix() -> CountMatrix {
        // 3 features × 4 specimens
        let mut tri_mat = TriMat::new((3, 4));
        tri_mat.add_triplet(0, 0, 10.0);
        tri_mat.add_triplet(0, 1, 20.0);
        tri_mat.add_triplet(0, 3, 5.5);
        tri_mat.add_triplet(1, 0, 100.0);
        tri_mat.add_triplet(1, 1, 200.0);
        tri_mat.add_triplet(1, 2, 150.0);
        tri_mat.add_triplet(1, 3, 175.0);
        tri_mat.add_triplet(2, 0, 1.0);

        let feature_ids = vec!["ENSG1".to_string(), "ENSG2".to_string(), "ENSG3".to_string()];
        let sample_ids = vec![
            "S1".to_string(),
            "S2".to_string(),
            "S3".to_string(),
            "S4".to_string(),
        ];

        CountMatrix::new(tri_mat.to_csr(), "gene_id".to_string(), feature_ids, sample_ids)
            .unwrap()
    }

    #[test]
    fn test_dimensions_and_values() {
        let mat = create_test_matrix();
        assert_eq!(mat.n_features(), 3);
        assert_eq!(mat.n_samples(), 4);
        assert_eq!(mat.get(0, 3), 5.5);
        assert_eq!(mat.get(2, 1), 0.0);
    }

    #[test]
    fn test_col_sums() {
        let mat = create_test_matrix();
        assert_eq!(mat.col_sums(), vec![111.0, 220.0, 150.0, 180.5]);
    }

    #[test]
    fn test_reindex_samples() {
        let mat = create_test_matrix();
        let ids = vec!["S4".to_string(), "S1".to_string()];
        let subset = mat.reindex_samples(&ids).unwrap();

        assert_eq!(subset.sample_ids(), &["S4", "S1"]);
        assert_eq!(subset.get(0, 0), 5.5);
        assert_eq!(subset.get(0, 1), 10.0);
        assert_eq!(subset.get(1, 0), 175.0);

        match mat.reindex_samples(&["S9".to_string()]) {
            Err(AlignError::MissingSpecimens(ids)) => assert_eq!(ids, vec!["S9"]),
            other => panic!("expected MissingSpecimens, got {:?}", other),
        }
    }

    #[test]
    fn test_load_plain_tsv_with_missing() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "gene_id\tA-1\tB 2").unwrap();
        writeln!(file, "g1\t1.5\t0").unwrap();
        writeln!(file, "g2\tNA\t3").unwrap();
        file.flush().unwrap();

        let mat = CountMatrix::from_path(file.path(), CountsLayout::Plain).unwrap();
        assert_eq!(mat.sample_ids(), &["A-1", "B 2"]);
        assert_eq!(mat.get(0, 0), 1.5);
        assert!(mat.get(1, 0).is_nan());
        assert_eq!(mat.col_sums(), vec![1.5, 3.0]);
    }

    #[test]
    fn test_load_salmon_layout() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "gene_id\tgene_name\tS1\tS2").unwrap();
        writeln!(file, "ENSG1\tTP53\t4\t5").unwrap();
        writeln!(file, "ENSG2\tBRCA1\t0\t2.25").unwrap();
        file.flush().unwrap();

        let mat = CountMatrix::from_path(file.path(), CountsLayout::SalmonMergedGeneCounts).unwrap();
        assert_eq!(mat.sample_ids(), &["S1", "S2"]);
        assert_eq!(mat.feature_ids(), &["ENSG1", "ENSG2"]);
        assert_eq!(mat.get(1, 1), 2.25);
    }

    #[test]
    fn test_salmon_layout_requires_gene_name() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "gene_id\tS1").unwrap();
        writeln!(file, "ENSG1\t4").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            CountMatrix::from_path(file.path(), CountsLayout::SalmonMergedGeneCounts),
            Err(AlignError::MissingColumn(c)) if c == "gene_name"
        ));
    }

    #[test]
    fn test_invalid_value() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "gene_id,S1").unwrap();
        writeln!(file, "g1,lots").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            CountMatrix::from_path(file.path(), CountsLayout::Plain),
            Err(AlignError::InvalidValue { row: 0, col: 0, .. })
        ));
    }

    #[test]
    fn test_csv_roundtrip() {
        let mat = create_test_matrix();
        let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        mat.to_csv(out.path()).unwrap();

        let text = std::fs::read_to_string(out.path()).unwrap();
        assert!(text.starts_with("gene_id,S1,S2,S3,S4\nENSG1,10,20,0,5.5\n"));

        let loaded = CountMatrix::from_path(out.path(), CountsLayout::Plain).unwrap();
        assert_eq!(loaded.sample_ids(), mat.sample_ids());
        for row in 0..mat.n_features() {
            for col in 0..mat.n_samples() {
                assert_eq!(loaded.get(row, col), mat.get(row, col));
            }
        }
    }
}
