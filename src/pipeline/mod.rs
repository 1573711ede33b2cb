//! End-to-end runs driven by a YAML configuration.

mod runner;

pub use runner::{manifest_stem, Pipeline, RunConfig, RunSummary};
