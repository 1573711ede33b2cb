//! Collation of per-comparison differential expression tables.
//!
//! Each input file is named `<variable>.<method>.csv`. Tools disagree on
//! column names, so the common aliases are mapped onto `pvalue`, `qvalue` and
//! `logFC` before the tables are stacked.

use crate::error::{AlignError, Result};
use crate::io::{read_table, write_table};
use crate::report::Reporter;
use indexmap::IndexSet;
use std::path::Path;

/// File name of the collated table.
pub const COLLATED_RESULTS: &str = "DE_results.csv";

const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("PValue", "pvalue"),
    ("P.Value", "pvalue"),
    ("log2FoldChange", "logFC"),
    ("QValue", "qvalue"),
    ("adj.P.Val", "qvalue"),
];

const MISSING_TOKENS: &[&str] = &["", "NA", "NaN", "nan", "Inf", "-Inf", "inf", "-inf"];

/// Canonical name for a results column.
pub fn canonical_column(name: &str) -> &str {
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// Split `<variable>.<method>.csv` at the first period.
pub fn parse_result_name(path: &Path) -> Result<(String, String)> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".csv").unwrap_or(&name);
    match stem.split_once('.') {
        Some((variable, method)) if !variable.is_empty() && !method.is_empty() => {
            Ok((variable.to_string(), method.to_string()))
        }
        _ => Err(AlignError::InvalidSpecification(format!(
            "Results file name must look like <variable>.<method>.csv: {}",
            name
        ))),
    }
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.trim())
}

/// `-log10(p)` with p floored at the smallest positive p in `values`.
pub fn neg_log10_floored(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let floor = values
        .iter()
        .flatten()
        .copied()
        .filter(|p| *p > 0.0)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |m| m.min(p))));
    values
        .iter()
        .map(|p| {
            p.map(|p| match floor {
                Some(floor) => -p.max(floor).log10(),
                None => -p.log10(),
            })
        })
        .collect()
}

/// Stacked results from every comparison and method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollatedResults {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CollatedResults {
    /// Read a previously written collated table.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let table = read_table(path)?;
        Ok(Self {
            header: table.header,
            rows: table.rows,
        })
    }

    /// Write as CSV.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_table(path, &self.header, &self.rows)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Position of a column.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AlignError::MissingColumn(name.to_string()))
    }

    /// Distinct values of the `variable` column, in first-seen order.
    pub fn variables(&self) -> Result<Vec<String>> {
        let col = self.column_index("variable")?;
        let distinct: IndexSet<&str> = self.rows.iter().map(|r| r[col].as_str()).collect();
        Ok(distinct.into_iter().map(String::from).collect())
    }
}

/// Read, relabel and stack result tables.
///
/// Adds `method`, `variable` and `neg_log10_pvalue` columns. The output
/// columns are the union of the inputs in first-seen order; a row missing
/// any of them is dropped.
pub fn collate_results<P: AsRef<Path>>(paths: &[P], reporter: &dyn Reporter) -> Result<CollatedResults> {
    if paths.is_empty() {
        return Err(AlignError::EmptyData("No results files to collate".to_string()));
    }

    let mut columns: IndexSet<String> = IndexSet::new();
    let mut records: Vec<Vec<(String, String)>> = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let (variable, method) = parse_result_name(path)?;
        reporter.info(&format!(
            "Reading in {} results for {} from {}",
            method,
            variable,
            path.display()
        ));

        let table = read_table(path)?;
        let header: Vec<String> = table
            .header
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 && h.trim().is_empty() {
                    "gene_id".to_string()
                } else {
                    canonical_column(h).to_string()
                }
            })
            .collect();

        let p_col = header
            .iter()
            .position(|h| h == "pvalue")
            .ok_or_else(|| AlignError::MissingColumn("pvalue".to_string()))?;
        let pvalues: Vec<Option<f64>> = table
            .rows
            .iter()
            .map(|row| row[p_col].trim().parse::<f64>().ok().filter(|p| !p.is_nan()))
            .collect();
        let neg_log10 = neg_log10_floored(&pvalues);

        for h in header.iter().map(String::as_str).chain(["method", "variable", "neg_log10_pvalue"]) {
            columns.insert(h.to_string());
        }

        for (row, score) in table.rows.into_iter().zip(neg_log10) {
            let mut record: Vec<(String, String)> = header.iter().cloned().zip(row).collect();
            record.push(("method".to_string(), method.clone()));
            record.push(("variable".to_string(), variable.clone()));
            record.push((
                "neg_log10_pvalue".to_string(),
                score.map(|s| s.to_string()).unwrap_or_default(),
            ));
            records.push(record);
        }
    }

    let total = records.len();
    let header: Vec<String> = columns.into_iter().collect();
    let rows: Vec<Vec<String>> = records
        .into_iter()
        .filter_map(|record| {
            let row: Vec<String> = header
                .iter()
                .map(|h| {
                    record
                        .iter()
                        .find(|(name, _)| name == h)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect();
            if row.iter().any(|cell| is_missing(cell)) {
                None
            } else {
                Some(row)
            }
        })
        .collect();

    if rows.len() < total {
        reporter.warn(&format!(
            "Dropped {} of {} result rows with missing values",
            total - rows.len(),
            total
        ));
    }

    Ok(CollatedResults { header, rows })
}
