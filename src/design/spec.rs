//! Comparison design specification.

use super::filter::FilterExpr;
use crate::error::{AlignError, Result};
use serde::{Deserialize, Serialize};

/// The design as supplied by a user: four free-form strings.
///
/// This is the shape found in run configurations and on the command line.
/// It becomes a [`DesignSpec`] through [`RawDesign::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDesign {
    /// Manifest column defining the groups.
    pub comparison_column: String,
    /// Baseline value for categorical comparisons.
    pub reference_value: String,
    /// Comma-separated grouping columns.
    pub grouping_columns: String,
    /// Optional row filter.
    pub filter: String,
}

impl RawDesign {
    /// Validate and convert into a [`DesignSpec`].
    ///
    /// Empty strings mean "not supplied". The filter expression is parsed
    /// here so that syntax errors surface before any data is read.
    pub fn parse(&self) -> Result<DesignSpec> {
        let comparison_column = self.comparison_column.trim();
        if comparison_column.is_empty() {
            return Err(AlignError::InvalidSpecification(
                "Must specify a comparison column".to_string(),
            ));
        }
        if comparison_column.contains(char::is_whitespace) {
            return Err(AlignError::InvalidSpecification(format!(
                "Comparison column name cannot contain spaces ({})",
                comparison_column
            )));
        }

        let grouping_columns = parse_grouping(&self.grouping_columns)?;

        let reference_value = if self.reference_value.trim().is_empty() {
            None
        } else {
            Some(self.reference_value.clone())
        };

        let filter = if self.filter.trim().is_empty() {
            None
        } else {
            Some(FilterExpr::parse(&self.filter)?)
        };

        Ok(DesignSpec {
            comparison_column: comparison_column.to_string(),
            reference_value,
            grouping_columns,
            filter,
        })
    }
}

fn parse_grouping(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                Err(AlignError::InvalidSpecification(format!(
                    "Empty grouping column in '{}'",
                    raw
                )))
            } else if entry.contains(char::is_whitespace) {
                Err(AlignError::InvalidSpecification(format!(
                    "Grouping column name cannot contain spaces ({})",
                    entry
                )))
            } else {
                Ok(entry.to_string())
            }
        })
        .collect()
}

/// A validated comparison design. Immutable once built.
#[derive(Debug, Clone)]
pub struct DesignSpec {
    comparison_column: String,
    reference_value: Option<String>,
    grouping_columns: Vec<String>,
    filter: Option<FilterExpr>,
}

impl DesignSpec {
    /// Build directly from parts, applying the same checks as [`RawDesign::parse`].
    pub fn new(
        comparison_column: &str,
        reference_value: Option<&str>,
        grouping_columns: &[&str],
        filter: Option<&str>,
    ) -> Result<Self> {
        RawDesign {
            comparison_column: comparison_column.to_string(),
            reference_value: reference_value.unwrap_or_default().to_string(),
            grouping_columns: grouping_columns.join(","),
            filter: filter.unwrap_or_default().to_string(),
        }
        .parse()
    }

    pub fn comparison_column(&self) -> &str {
        &self.comparison_column
    }

    pub fn reference_value(&self) -> Option<&str> {
        self.reference_value.as_deref()
    }

    pub fn grouping_columns(&self) -> &[String] {
        &self.grouping_columns
    }

    pub fn filter(&self) -> Option<&FilterExpr> {
        self.filter.as_ref()
    }
}
