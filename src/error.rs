//! Error types for the specimen-align library.

use thiserror::Error;

/// Main error type for the library.
///
/// Every variant is terminal: a run that hits one of these aborts and must be
/// corrected and re-invoked.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Did not recognize file extension: {extension}")]
    UnrecognizedFormat { extension: String },

    #[error("Labels must be unique: {}", format_counts(.duplicates))]
    DuplicateLabel { duplicates: Vec<(String, usize)> },

    #[error("Missing specimens from counts columns: {}", .0.join(", "))]
    MissingSpecimens(Vec<String>),

    #[error("No overlap found between manifest and counts")]
    NoOverlap,

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Filter excludes too many rows ({remaining} remaining): {expression}")]
    FilterTooRestrictive { expression: String, remaining: usize },

    #[error("Not enough specimens have valid grouping information ({remaining} remaining for {})", .columns.join(", "))]
    InsufficientGroupingData {
        columns: Vec<String>,
        remaining: usize,
    },

    #[error("Column ({column}) is numeric - reference value '{reference}' not allowed")]
    UnexpectedReference { column: String, reference: String },

    #[error("Column ({column}) is not numeric ({reason}), a reference value must be defined")]
    MissingReference { column: String, reason: String },

    #[error("Reference value ({reference}) not found in column ({column})")]
    ReferenceNotFound { column: String, reference: String },

    #[error("Filter expression error: {0}")]
    FilterParse(String),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_counts(duplicates: &[(String, usize)]) -> String {
    duplicates
        .iter()
        .map(|(label, n)| format!("{} (x{})", label, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, AlignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_lists_every_label() {
        let err = AlignError::DuplicateLabel {
            duplicates: vec![("S1".to_string(), 2), ("S9".to_string(), 3)],
        };
        assert_eq!(err.to_string(), "Labels must be unique: S1 (x2), S9 (x3)");
    }

    #[test]
    fn test_missing_specimens_message() {
        let err = AlignError::MissingSpecimens(vec!["S2".to_string(), "S4".to_string()]);
        assert_eq!(
            err.to_string(),
            "Missing specimens from counts columns: S2, S4"
        );
    }
}
