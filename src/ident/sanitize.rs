//! Identifier and column-name sanitizers.

use regex::Regex;
use std::sync::OnceLock;

fn non_identifier_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^0-9a-zA-Z._]").expect("static pattern compiles"))
}

/// Replace every character that is not an ASCII letter, digit, period or
/// underscore with a period.
///
/// This mirrors the header mangling applied by R-based tools and is
/// idempotent: the output alphabet is a subset of the allowed alphabet.
///
/// # Examples
/// ```
/// use specimen_align::ident::sanitize_identifier;
/// assert_eq!(sanitize_identifier("2-B"), "2.B");
/// assert_eq!(sanitize_identifier("S 1/a"), "S.1.a");
/// ```
pub fn sanitize_identifier(raw: &str) -> String {
    non_identifier_chars().replace_all(raw, ".").into_owned()
}

/// Column name safe for R formulas: spaces and periods become underscores.
pub fn sanitize_column_name(name: &str) -> String {
    name.replace([' ', '.'], "_")
}

/// Categorical level used as a column and file name: spaces, periods and
/// dashes become underscores.
pub fn sanitize_level_name(level: &str) -> String {
    level.replace([' ', '.', '-'], "_")
}
