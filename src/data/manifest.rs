//! Specimen manifest: an ordered table keyed by a unique specimen identifier.

use crate::error::{AlignError, Result};
use crate::ident::{sanitize_identifier, validate_unique};
use crate::io::{read_table, write_table, DelimitedTable};
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Cell values read as missing.
const MISSING_TOKENS: &[&str] = &["", "NA", "na", "NaN", "nan", "N/A", "NULL", "null"];

/// A manifest cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Text as read from the file (surrounding whitespace preserved).
    Categorical(String),
    /// Numeric value produced by type detection.
    Continuous(f64),
    /// 0/1 indicator produced by a categorical comparison.
    Binary(u8),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Interpret a raw cell, mapping the conventional missing tokens to
    /// [`Variable::Missing`].
    pub fn parse(raw: &str) -> Self {
        if MISSING_TOKENS.contains(&raw.trim()) {
            Variable::Missing
        } else {
            Variable::Categorical(raw.to_string())
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value, parsing text when needed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            Variable::Binary(b) => Some(*b as f64),
            Variable::Categorical(s) => s.trim().parse::<f64>().ok(),
            Variable::Missing => None,
        }
    }

    /// Text written to output tables.
    pub fn render(&self) -> String {
        match self {
            Variable::Categorical(s) => s.clone(),
            Variable::Continuous(v) => format!("{:?}", v),
            Variable::Binary(b) => b.to_string(),
            Variable::Missing => String::new(),
        }
    }
}

/// How manifest identifiers are rewritten when loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestNaming {
    /// Keep identifiers exactly as written.
    #[default]
    Verbatim,
    /// Apply the identifier sanitizer, matching headers written by R.
    Sanitized,
    /// Prefix `X` to identifiers that start with a digit.
    DigitPrefixed,
}

impl ManifestNaming {
    /// Rewrite a single identifier.
    pub fn apply(&self, id: &str) -> String {
        match self {
            ManifestNaming::Verbatim => id.to_string(),
            ManifestNaming::Sanitized => sanitize_identifier(id),
            ManifestNaming::DigitPrefixed => {
                if id.starts_with(|c: char| c.is_ascii_digit()) {
                    format!("X{}", id)
                } else {
                    id.to_string()
                }
            }
        }
    }
}

/// Specimen metadata, one row per specimen, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Header of the identifier column.
    id_column: String,
    /// Specimen identifiers in order.
    sample_ids: Vec<String>,
    /// Metadata column names.
    column_names: Vec<String>,
    /// Cells, `rows[i][j]` for specimen `i` and column `j`.
    rows: Vec<Vec<Variable>>,
}

impl Manifest {
    /// Create a manifest from its parts.
    ///
    /// Identifiers must be unique and every row must have one cell per column.
    pub fn new(
        id_column: String,
        sample_ids: Vec<String>,
        column_names: Vec<String>,
        rows: Vec<Vec<Variable>>,
    ) -> Result<Self> {
        if rows.len() != sample_ids.len() {
            return Err(AlignError::EmptyData(format!(
                "manifest has {} identifiers but {} rows",
                sample_ids.len(),
                rows.len()
            )));
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != column_names.len())
        {
            return Err(AlignError::EmptyData(format!(
                "manifest row {} has {} cells, expected {}",
                i,
                row.len(),
                column_names.len()
            )));
        }
        validate_unique(&sample_ids)?;
        Ok(Self {
            id_column,
            sample_ids,
            column_names,
            rows,
        })
    }

    /// Build a manifest from a raw table whose first column holds identifiers.
    pub fn from_table(table: DelimitedTable) -> Result<Self> {
        if table.n_rows() == 0 {
            return Err(AlignError::EmptyData("Manifest must have at least one row".to_string()));
        }
        if table.n_columns() < 2 {
            return Err(AlignError::EmptyData(
                "Manifest must have at least one metadata column".to_string(),
            ));
        }

        let mut header = table.header.into_iter();
        let id_column = header.next().unwrap_or_default();
        let column_names: Vec<String> = header.collect();

        let mut sample_ids = Vec::with_capacity(table.rows.len());
        let mut rows = Vec::with_capacity(table.rows.len());
        for record in table.rows {
            let mut cells = record.into_iter();
            sample_ids.push(cells.next().unwrap_or_default());
            rows.push(
                cells
                    .take(column_names.len())
                    .map(|raw| Variable::parse(&raw))
                    .collect(),
            );
        }

        Self::new(id_column, sample_ids, column_names, rows)
    }

    /// Load a manifest from a CSV or TSV file (optionally gzip-compressed).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_table(read_table(path)?)
    }

    /// Load a manifest and rewrite its identifiers with a naming policy.
    pub fn from_path_with_naming<P: AsRef<Path>>(
        path: P,
        naming: ManifestNaming,
        reporter: &dyn Reporter,
    ) -> Result<Self> {
        reporter.info(&format!("Reading in {}", path.as_ref().display()));
        let manifest = Self::from_path(path)?;
        reporter.info(&format!("Read in {} specimens", manifest.n_samples()));
        manifest.renamed_ids(naming, reporter)
    }

    /// Copy with every identifier rewritten by `naming`.
    ///
    /// Rewriting may merge identifiers, so uniqueness is checked again.
    pub fn renamed_ids(&self, naming: ManifestNaming, reporter: &dyn Reporter) -> Result<Self> {
        let sample_ids: Vec<String> = self
            .sample_ids
            .iter()
            .map(|id| {
                let renamed = naming.apply(id);
                if &renamed != id {
                    reporter.info(&format!("Specimen '{}' will be modified to {}", id, renamed));
                }
                renamed
            })
            .collect();
        validate_unique(&sample_ids)?;
        Ok(Self {
            sample_ids,
            ..self.clone()
        })
    }

    /// Write as CSV with the identifier column first.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let header: Vec<String> = std::iter::once(self.id_column.clone())
            .chain(self.column_names.iter().cloned())
            .collect();
        let rows: Vec<Vec<String>> = self
            .sample_ids
            .iter()
            .zip(&self.rows)
            .map(|(id, row)| {
                std::iter::once(id.clone())
                    .chain(row.iter().map(Variable::render))
                    .collect()
            })
            .collect();
        write_table(path, &header, &rows)
    }

    /// Header of the identifier column.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Specimen identifiers in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Metadata column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of specimens.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of metadata columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Check if a specimen exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.sample_ids.iter().any(|s| s == sample_id)
    }

    /// Position of a column.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == column)
    }

    /// Cells of one specimen, by row position.
    pub fn row(&self, index: usize) -> &[Variable] {
        &self.rows[index]
    }

    /// Get a value for a specimen and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        let row = self.sample_ids.iter().position(|s| s == sample_id)?;
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// All values of a column, in specimen order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        let col = self
            .column_index(column)
            .ok_or_else(|| AlignError::MissingColumn(column.to_string()))?;
        Ok(self.rows.iter().map(|row| &row[col]).collect())
    }

    /// Keep the rows at the given positions, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            id_column: self.id_column.clone(),
            sample_ids: indices.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            column_names: self.column_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, &k)| k)
            .map(|(i, _)| i)
            .collect();
        self.select_rows(&indices)
    }

    /// Reindex to exactly `sample_ids`, in that order.
    ///
    /// Every requested identifier must be present.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let position: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let missing: Vec<String> = sample_ids
            .iter()
            .filter(|s| !position.contains_key(s.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AlignError::MissingSpecimens(missing));
        }

        let indices: Vec<usize> = sample_ids.iter().map(|s| position[s.as_str()]).collect();
        Ok(self.select_rows(&indices))
    }

    /// Copy without the listed specimens; unknown identifiers are ignored.
    pub fn drop_samples(&self, sample_ids: &[String]) -> Self {
        let drop: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();
        let keep: Vec<bool> = self
            .sample_ids
            .iter()
            .map(|s| !drop.contains(s.as_str()))
            .collect();
        self.filter_rows(&keep)
    }

    /// Copy with the values of an existing column replaced.
    pub fn with_column_values(&self, column: &str, values: Vec<Variable>) -> Result<Self> {
        let col = self
            .column_index(column)
            .ok_or_else(|| AlignError::MissingColumn(column.to_string()))?;
        self.check_length(values.len())?;
        let mut out = self.clone();
        for (row, value) in out.rows.iter_mut().zip(values) {
            row[col] = value;
        }
        Ok(out)
    }

    /// Copy with a column renamed.
    pub fn rename_column(&self, from: &str, to: &str) -> Result<Self> {
        let col = self
            .column_index(from)
            .ok_or_else(|| AlignError::MissingColumn(from.to_string()))?;
        let mut out = self.clone();
        out.column_names[col] = to.to_string();
        Ok(out)
    }

    /// Copy with a column removed.
    pub fn drop_column(&self, column: &str) -> Result<Self> {
        let col = self
            .column_index(column)
            .ok_or_else(|| AlignError::MissingColumn(column.to_string()))?;
        let mut out = self.clone();
        out.column_names.remove(col);
        for row in out.rows.iter_mut() {
            row.remove(col);
        }
        Ok(out)
    }

    /// Copy with a new column appended.
    pub fn push_column(&self, column: &str, values: Vec<Variable>) -> Result<Self> {
        self.check_length(values.len())?;
        let mut out = self.clone();
        out.column_names.push(column.to_string());
        for (row, value) in out.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(out)
    }

    fn check_length(&self, n: usize) -> Result<()> {
        if n != self.n_samples() {
            return Err(AlignError::EmptyData(format!(
                "expected {} values, got {}",
                self.n_samples(),
                n
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "sample,group,age,batch").unwrap();
        writeln!(file, "S1,control,25,A").unwrap();
        writeln!(file, "S2,treatment,30,NA").unwrap();
        writeln!(file, "3-C, control ,35,B").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_manifest() {
        let file = create_test_csv();
        let meta = Manifest::from_path(file.path()).unwrap();

        assert_eq!(meta.id_column(), "sample");
        assert_eq!(meta.n_samples(), 3);
        assert_eq!(meta.sample_ids(), &["S1", "S2", "3-C"]);
        assert_eq!(meta.column_names(), &["group", "age", "batch"]);
        assert!(meta.get("S2", "batch").unwrap().is_missing());
        assert_eq!(
            meta.get("3-C", "group").unwrap().as_categorical(),
            Some(" control ")
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "id\tgroup").unwrap();
        writeln!(file, "S1\ta").unwrap();
        writeln!(file, "S1\tb").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Manifest::from_path(file.path()),
            Err(AlignError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_requires_metadata_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id").unwrap();
        writeln!(file, "S1").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Manifest::from_path(file.path()),
            Err(AlignError::EmptyData(_))
        ));
    }

    #[test]
    fn test_naming_policies() {
        assert_eq!(ManifestNaming::Verbatim.apply("1 A"), "1 A");
        assert_eq!(ManifestNaming::Sanitized.apply("1 A"), "1.A");
        assert_eq!(ManifestNaming::DigitPrefixed.apply("1A"), "X1A");
        assert_eq!(ManifestNaming::DigitPrefixed.apply("A1"), "A1");
    }

    #[test]
    fn test_load_with_naming_reports_renames() {
        let file = create_test_csv();
        let reporter = RecordingReporter::new();
        let meta =
            Manifest::from_path_with_naming(file.path(), ManifestNaming::Sanitized, &reporter)
                .unwrap();
        assert_eq!(meta.sample_ids(), &["S1", "S2", "3.C"]);
        assert!(reporter
            .infos()
            .iter()
            .any(|m| m.contains("'3-C' will be modified to 3.C")));
    }

    #[test]
    fn test_naming_collision_rejected() {
        let meta = Manifest::new(
            "id".to_string(),
            vec!["a b".to_string(), "a-b".to_string()],
            vec!["g".to_string()],
            vec![vec![Variable::Missing], vec![Variable::Missing]],
        )
        .unwrap();
        let reporter = RecordingReporter::new();
        assert!(matches!(
            meta.renamed_ids(ManifestNaming::Sanitized, &reporter),
            Err(AlignError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn test_subset_and_drop() {
        let meta = Manifest::from_path(create_test_csv().path()).unwrap();

        let subset = meta
            .subset_samples(&["3-C".to_string(), "S1".to_string()])
            .unwrap();
        assert_eq!(subset.sample_ids(), &["3-C", "S1"]);
        assert_eq!(subset.get("S1", "age").unwrap().as_number(), Some(25.0));

        match meta.subset_samples(&["S9".to_string()]) {
            Err(AlignError::MissingSpecimens(ids)) => assert_eq!(ids, vec!["S9"]),
            other => panic!("expected MissingSpecimens, got {:?}", other),
        }

        let dropped = meta.drop_samples(&["S2".to_string(), "unknown".to_string()]);
        assert_eq!(dropped.sample_ids(), &["S1", "3-C"]);
    }

    #[test]
    fn test_column_edits() {
        let meta = Manifest::from_path(create_test_csv().path()).unwrap();
        let edited = meta
            .drop_column("group")
            .unwrap()
            .push_column("case", vec![Variable::Binary(1), Variable::Binary(0), Variable::Binary(1)])
            .unwrap()
            .rename_column("age", "age_years")
            .unwrap();

        assert_eq!(edited.column_names(), &["age_years", "batch", "case"]);
        assert_eq!(edited.get("S2", "case"), Some(&Variable::Binary(0)));
        assert!(matches!(
            meta.column("missing"),
            Err(AlignError::MissingColumn(c)) if c == "missing"
        ));
    }

    #[test]
    fn test_csv_output() {
        let meta = Manifest::from_path(create_test_csv().path()).unwrap();
        let meta = meta
            .with_column_values(
                "age",
                vec![
                    Variable::Continuous(25.0),
                    Variable::Continuous(30.5),
                    Variable::Missing,
                ],
            )
            .unwrap();

        let out = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        meta.to_csv(out.path()).unwrap();
        let table = read_table(out.path()).unwrap();
        assert_eq!(table.header, vec!["sample", "group", "age", "batch"]);
        assert_eq!(table.rows[0], vec!["S1", "control", "25.0", "A"]);
        assert_eq!(table.rows[1], vec!["S2", "treatment", "30.5", ""]);
        assert_eq!(table.rows[2][2], "");
    }
}
