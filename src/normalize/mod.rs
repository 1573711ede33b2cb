//! Normalization of aligned counts.
//!
//! - **log-CPM**: `ln(1 + 1e6 * x / library_size)`, the input to embedding
//!   and visualization tools

pub mod log_cpm;

pub use log_cpm::{norm_log_cpm, LogCpmMatrix, CPM};
