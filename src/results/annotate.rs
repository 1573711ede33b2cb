//! Per-gene annotation of collated results for one comparison variable.

use super::collate::CollatedResults;
use crate::error::{AlignError, Result};
use crate::normalize::LogCpmMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Number of genes flagged by [`top_significant`] unless configured otherwise.
pub const DEFAULT_TOP_N: usize = 100;

/// One annotated gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub gene_id: String,
    pub method: String,
    pub pvalue: f64,
    pub qvalue: f64,
    #[serde(rename = "logFC")]
    pub log_fc: f64,
    pub neg_log10_qvalue: f64,
    pub top_significant: u8,
    pub mean_abund: Option<f64>,
    /// Plotting coordinates, each divided by its range.
    pub scaled_mean_abund: Option<f64>,
    #[serde(rename = "scaled_logFC")]
    pub scaled_log_fc: f64,
    pub scaled_neg_log10_qvalue: f64,
}

/// Floor values at the smallest positive one; missing values become 1.
pub fn clip_zeros(values: &[Option<f64>]) -> Vec<f64> {
    let threshold = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| *v > 0.0)
        .fold(f64::INFINITY, f64::min);
    values
        .iter()
        .map(|v| match v {
            Some(v) if threshold.is_finite() => v.max(threshold),
            Some(v) => *v,
            None => 1.0,
        })
        .collect()
}

/// Flag the `n` highest scores (ties at the threshold included).
pub fn top_significant(scores: &[f64], n: usize) -> Vec<u8> {
    let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| !s.is_nan()).collect();
    if n == 0 || sorted.is_empty() {
        return vec![0; scores.len()];
    }
    sorted.sort_by(|a, b| b.total_cmp(a));
    let threshold = sorted[n.min(sorted.len()) - 1];
    scores.iter().map(|s| u8::from(*s >= threshold)).collect()
}

/// Divide by the range when the values are not all equal.
pub fn scale_values(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if max > min {
        values.iter().map(|v| v / (max - min)).collect()
    } else {
        values.to_vec()
    }
}

fn parse_column(results: &CollatedResults, rows: &[usize], name: &str) -> Result<Vec<Option<f64>>> {
    let col = results.column_index(name)?;
    rows.iter()
        .map(|&r| {
            let raw = results.rows[r][col].trim();
            if raw.is_empty() || raw == "NA" {
                return Ok(None);
            }
            raw.parse::<f64>()
                .map(Some)
                .map_err(|_| AlignError::InvalidValue {
                    value: raw.to_string(),
                    row: r,
                    col,
                })
        })
        .collect()
}

/// Annotate the results for `variable`.
///
/// `log_cpm`, when given, supplies each gene's mean scaled abundance.
pub fn annotate_genes(
    results: &CollatedResults,
    variable: &str,
    log_cpm: Option<&LogCpmMatrix>,
    top_n: usize,
) -> Result<Vec<GeneRecord>> {
    let var_col = results.column_index("variable")?;
    let gene_col = results.column_index("gene_id")?;
    let method_col = results.column_index("method")?;
    let rows: Vec<usize> = (0..results.n_rows())
        .filter(|&r| results.rows[r][var_col] == variable)
        .collect();
    if rows.is_empty() {
        return Err(AlignError::EmptyData(format!(
            "No results for variable '{}'",
            variable
        )));
    }

    let pvalues = clip_zeros(&parse_column(results, &rows, "pvalue")?);
    let qvalues = clip_zeros(&parse_column(results, &rows, "qvalue")?);
    let log_fc: Vec<f64> = parse_column(results, &rows, "logFC")?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    let neg_log10_q: Vec<f64> = qvalues.iter().map(|q| -q.log10()).collect();
    let scores: Vec<f64> = neg_log10_q
        .iter()
        .zip(&log_fc)
        .map(|(q, fc)| q.abs() * fc.abs())
        .collect();
    let flags = top_significant(&scores, top_n);

    let means: HashMap<&str, f64> = match log_cpm {
        Some(m) => m
            .feature_ids
            .iter()
            .map(String::as_str)
            .zip(m.feature_means())
            .collect(),
        None => HashMap::new(),
    };
    let mean_abund: Vec<Option<f64>> = rows
        .iter()
        .map(|&r| means.get(results.rows[r][gene_col].as_str()).copied())
        .collect();

    let scaled_mean = scale_values(
        &mean_abund
            .iter()
            .map(|m| m.unwrap_or(f64::NAN))
            .collect::<Vec<_>>(),
    );
    let scaled_fc = scale_values(&log_fc);
    let scaled_q = scale_values(&neg_log10_q);

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, &r)| GeneRecord {
            gene_id: results.rows[r][gene_col].clone(),
            method: results.rows[r][method_col].clone(),
            pvalue: pvalues[i],
            qvalue: qvalues[i],
            log_fc: log_fc[i],
            neg_log10_qvalue: neg_log10_q[i],
            top_significant: flags[i],
            mean_abund: mean_abund[i],
            scaled_mean_abund: mean_abund[i].map(|_| scaled_mean[i]),
            scaled_log_fc: scaled_fc[i],
            scaled_neg_log10_qvalue: scaled_q[i],
        })
        .collect())
}

/// Write annotated genes as `<variable>.genes.csv` into `dir`.
pub fn write_gene_table<P: AsRef<Path>>(dir: P, variable: &str, genes: &[GeneRecord]) -> Result<std::path::PathBuf> {
    let path = dir.as_ref().join(format!("{}.genes.csv", variable));
    let mut writer = csv::Writer::from_path(&path)?;
    for gene in genes {
        writer.serialize(gene)?;
    }
    writer.flush()?;
    Ok(path)
}
