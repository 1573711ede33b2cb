//! Specimen identifier handling.
//!
//! - **sanitize**: the character mangling applied by upstream tools
//! - **unique**: duplicate label detection
//! - **reconcile**: recovering manifest identifiers from mangled count headers

mod reconcile;
mod sanitize;
mod unique;

pub use reconcile::{default_cascade, IdentifierMap, Mangling, Reconciler, Resolution};
pub use sanitize::{sanitize_column_name, sanitize_identifier, sanitize_level_name};
pub use unique::{duplicate_counts, validate_unique};
