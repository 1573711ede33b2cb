//! Comparison design generation.
//!
//! A manifest moves through a fixed sequence of stages:
//!
//! ```text
//! Loaded -> Filtered -> GroupValidated -> TypeDetected -> Continuous | Categorical(n)
//! ```
//!
//! Each stage either produces a new manifest or aborts the whole run. No table
//! is written until every table has been built, so a failure leaves no partial
//! output behind.

use super::spec::DesignSpec;
use crate::data::{Manifest, Variable};
use crate::error::{AlignError, Result};
use crate::ident::{sanitize_column_name, sanitize_level_name, validate_unique};
use crate::report::Reporter;
use indexmap::IndexSet;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the base design manifest written next to the comparison tables.
pub const BASE_MANIFEST: &str = "manifest.csv";

/// Result of type detection on the comparison column.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Every present value is a number; missing cells are `None`.
    Numeric(Vec<Option<f64>>),
    /// At least one present value is not a number, or none are present.
    NonNumeric(String),
}

/// Classify a column of values as numeric or not.
///
/// Missing cells do not count either way, but a column with no present
/// values at all is not numeric.
pub fn classify(values: &[&Variable]) -> Classification {
    let mut numbers = Vec::with_capacity(values.len());
    let mut present = 0usize;
    for value in values {
        if value.is_missing() {
            numbers.push(None);
            continue;
        }
        present += 1;
        match value.as_number() {
            Some(n) => numbers.push(Some(n)),
            None => {
                return Classification::NonNumeric(format!(
                    "value '{}' is not a number",
                    value.render()
                ))
            }
        }
    }
    if present == 0 {
        return Classification::NonNumeric("no values present".to_string());
    }
    Classification::Numeric(numbers)
}

/// What a comparison table compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonKind {
    /// Numeric comparison column, under its sanitized name.
    Continuous { column: String },
    /// One level against the reference; `column` is the sanitized level.
    Categorical {
        level: String,
        reference: String,
        column: String,
    },
}

/// One design table handed to downstream analysis.
#[derive(Debug, Clone)]
pub struct ComparisonTable {
    kind: ComparisonKind,
    manifest: Manifest,
}

impl ComparisonTable {
    pub fn kind(&self) -> &ComparisonKind {
        &self.kind
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Name of the column carrying the comparison.
    pub fn column(&self) -> &str {
        match &self.kind {
            ComparisonKind::Continuous { column } => column,
            ComparisonKind::Categorical { column, .. } => column,
        }
    }

    /// Output file name for this table.
    pub fn file_name(&self) -> String {
        match &self.kind {
            ComparisonKind::Continuous { column } => format!("{}.continuous.manifest.csv", column),
            ComparisonKind::Categorical { column, .. } => {
                format!("{}.categorical.manifest.csv", column)
            }
        }
    }
}

impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ComparisonKind::Continuous { column } => write!(f, "{} (continuous)", column),
            ComparisonKind::Categorical {
                level, reference, ..
            } => write!(f, "{} vs. {}", level, reference),
        }
    }
}

/// Everything produced by one generator run.
#[derive(Debug, Clone)]
pub struct DesignOutcome {
    /// Manifest after filtering and grouping, before type detection.
    pub base: Manifest,
    /// Comparison tables, in first-seen level order.
    pub tables: Vec<ComparisonTable>,
}

impl DesignOutcome {
    /// Write the base manifest and every table into `dir`.
    pub fn write_all<P: AsRef<Path>>(&self, dir: P, reporter: &dyn Reporter) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.tables.len() + 1);
        let base = dir.join(BASE_MANIFEST);
        self.base.to_csv(&base)?;
        written.push(base);

        for table in &self.tables {
            let path = dir.join(table.file_name());
            reporter.info(&format!("Writing out file to {}", path.display()));
            table.manifest.to_csv(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Builds comparison tables from an aligned manifest.
pub struct DesignGenerator<'a> {
    spec: &'a DesignSpec,
    reporter: &'a dyn Reporter,
}

impl<'a> DesignGenerator<'a> {
    pub fn new(spec: &'a DesignSpec, reporter: &'a dyn Reporter) -> Self {
        Self { spec, reporter }
    }

    /// Run every stage and return the tables.
    pub fn generate(&self, manifest: &Manifest) -> Result<DesignOutcome> {
        if manifest.n_samples() <= 1 {
            return Err(AlignError::EmptyData(format!(
                "Manifest does not contain enough rows ({})",
                manifest.n_samples()
            )));
        }

        let filtered = self.apply_filter(manifest)?;
        let base = self.validate_grouping(&filtered)?;

        let column = self.spec.comparison_column();
        let values = base.column(column)?;
        self.reporter
            .info(&format!("Checking for all numeric values in {}", column));

        let tables = match classify(&values) {
            Classification::Numeric(numbers) => {
                self.reporter.info("Values appear to all be numeric");
                vec![self.continuous_table(&base, numbers)?]
            }
            Classification::NonNumeric(reason) => {
                self.reporter
                    .info(&format!("Values are not all numeric: {}", reason));
                self.categorical_tables(&base, reason)?
            }
        };

        Ok(DesignOutcome { base, tables })
    }

    /// Filtered: keep rows matching the filter; more than one must remain.
    fn apply_filter(&self, manifest: &Manifest) -> Result<Manifest> {
        let Some(filter) = self.spec.filter() else {
            return Ok(manifest.clone());
        };
        self.reporter.info(&format!("Applying filter: {}", filter));
        let kept = manifest.filter_rows(&filter.evaluate(manifest)?);
        if kept.n_samples() <= 1 {
            return Err(AlignError::FilterTooRestrictive {
                expression: filter.source().to_string(),
                remaining: kept.n_samples(),
            });
        }
        self.reporter.info(&format!(
            "{} / {} specimens pass the filter",
            kept.n_samples(),
            manifest.n_samples()
        ));
        Ok(kept)
    }

    /// GroupValidated: drop rows missing any grouping value.
    fn validate_grouping(&self, manifest: &Manifest) -> Result<Manifest> {
        let groups = self.spec.grouping_columns();
        if groups.is_empty() {
            return Ok(manifest.clone());
        }
        self.reporter
            .info(&format!("Validating grouping columns: {}", groups.join(", ")));

        let mut keep = vec![true; manifest.n_samples()];
        for group in groups {
            for (k, value) in keep.iter_mut().zip(manifest.column(group)?) {
                *k &= !value.is_missing();
            }
        }
        let kept = manifest.filter_rows(&keep);
        if kept.n_samples() <= 1 {
            return Err(AlignError::InsufficientGroupingData {
                columns: groups.to_vec(),
                remaining: kept.n_samples(),
            });
        }
        Ok(kept)
    }

    fn continuous_table(&self, base: &Manifest, numbers: Vec<Option<f64>>) -> Result<ComparisonTable> {
        let column = self.spec.comparison_column();
        if let Some(reference) = self.spec.reference_value() {
            return Err(AlignError::UnexpectedReference {
                column: column.to_string(),
                reference: reference.to_string(),
            });
        }

        let renamed = sanitize_column_name(column);
        let values = numbers
            .into_iter()
            .map(|n| n.map_or(Variable::Missing, Variable::Continuous))
            .collect();
        let manifest = base
            .with_column_values(column, values)?
            .rename_column(column, &renamed)?;
        validate_unique(manifest.column_names())?;

        Ok(ComparisonTable {
            kind: ComparisonKind::Continuous { column: renamed },
            manifest,
        })
    }

    fn categorical_tables(&self, base: &Manifest, reason: String) -> Result<Vec<ComparisonTable>> {
        let column = self.spec.comparison_column();
        let reference = self
            .spec
            .reference_value()
            .ok_or_else(|| AlignError::MissingReference {
                column: column.to_string(),
                reason,
            })?;

        let trimmed: Vec<Variable> = base
            .column(column)?
            .into_iter()
            .map(|v| match v {
                Variable::Missing => Variable::Missing,
                other => Variable::Categorical(other.render().trim().to_string()),
            })
            .collect();

        let n_reference = trimmed
            .iter()
            .filter(|v| v.as_categorical() == Some(reference))
            .count();
        if n_reference == 0 {
            return Err(AlignError::ReferenceNotFound {
                column: column.to_string(),
                reference: reference.to_string(),
            });
        }

        let levels: Vec<&str> = trimmed
            .iter()
            .filter_map(Variable::as_categorical)
            .filter(|v| *v != reference)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let names: Vec<String> = levels.iter().map(|l| sanitize_level_name(l)).collect();
        validate_unique(&names)?;

        if levels.is_empty() {
            self.reporter.warn(&format!(
                "Column ({}) only contains the reference value ({})",
                column, reference
            ));
        }

        let base = base.with_column_values(column, trimmed.clone())?;
        let tables = levels
            .par_iter()
            .zip(names.par_iter())
            .map(|(level, name)| self.categorical_table(&base, &trimmed, level, reference, name))
            .collect::<Result<Vec<_>>>()?;

        for table in &tables {
            self.reporter.info(&format!(
                "Formatting a table to compare {}: using {} / {} samples",
                table,
                table.manifest.n_samples(),
                base.n_samples()
            ));
        }
        Ok(tables)
    }

    fn categorical_table(
        &self,
        base: &Manifest,
        values: &[Variable],
        level: &str,
        reference: &str,
        name: &str,
    ) -> Result<ComparisonTable> {
        let column = self.spec.comparison_column();
        let keep: Vec<bool> = values
            .iter()
            .map(|v| matches!(v.as_categorical(), Some(s) if s == level || s == reference))
            .collect();

        let indicator: Vec<Variable> = values
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(v, _)| Variable::Binary(u8::from(v.as_categorical() == Some(level))))
            .collect();

        let manifest = base
            .filter_rows(&keep)
            .drop_column(column)?
            .push_column(name, indicator)?;
        validate_unique(manifest.column_names())?;

        Ok(ComparisonTable {
            kind: ComparisonKind::Categorical {
                level: level.to_string(),
                reference: reference.to_string(),
                column: name.to_string(),
            },
            manifest,
        })
    }
}

/// Convenience wrapper around [`DesignGenerator::generate`].
pub fn generate_design(
    manifest: &Manifest,
    spec: &DesignSpec,
    reporter: &dyn Reporter,
) -> Result<DesignOutcome> {
    DesignGenerator::new(spec, reporter).generate(manifest)
}
