//! Data structures for specimen manifests and count matrices.

mod count_matrix;
mod manifest;

pub use count_matrix::{CountMatrix, CountsLayout};
pub use manifest::{Manifest, ManifestNaming, Variable};
