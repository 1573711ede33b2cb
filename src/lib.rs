//! Specimen Alignment Library
//!
//! This library reconciles specimen manifests with count matrices produced
//! by upstream quantification tools, and turns an aligned manifest into the
//! per-comparison design tables consumed by differential expression tools.
//!
//! # Overview
//!
//! The library is organized into modules:
//!
//! - **io**: Delimited table reading and writing (CSV/TSV, gzip aware)
//! - **ident**: Identifier sanitizing, duplicate checks and header reconciliation
//! - **data**: Core data structures (Manifest, CountMatrix)
//! - **align**: Aligning a manifest to the columns of a count matrix
//! - **design**: Comparison specifications, row filters and design tables
//! - **normalize**: Log counts-per-million scaling
//! - **results**: Collation and annotation of differential expression results
//! - **charts**: Index of visualization configurations
//! - **pipeline**: YAML-configured end-to-end runs
//! - **report**: Injected info/warning reporting
//!
//! # Example
//!
//! ```no_run
//! use specimen_align::prelude::*;
//!
//! let reporter = LogReporter::default();
//!
//! // Load data
//! let manifest = Manifest::from_path("samples.csv").unwrap();
//! let counts = CountMatrix::from_path("counts.tsv", CountsLayout::Plain).unwrap();
//!
//! // Recover mangled headers and align
//! let reconciler = Reconciler::new(default_cascade());
//! let (_, aligned) =
//!     reconcile_and_align(&manifest, &counts, &reconciler, AlignPolicy::Strict, &reporter)
//!         .unwrap();
//!
//! // One design table per comparison level
//! let spec = DesignSpec::new("condition", Some("control"), &["batch"], None).unwrap();
//! let outcome = generate_design(&aligned.manifest, &spec, &reporter).unwrap();
//! outcome.write_all("out", &reporter).unwrap();
//! ```

pub mod align;
pub mod charts;
pub mod data;
pub mod design;
pub mod error;
pub mod ident;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod results;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::align::{align, reconcile_and_align, AlignPolicy, AlignedTables, Snapshot};
    pub use crate::charts::{index_charts, write_chart_index, ChartEntry};
    pub use crate::data::{CountMatrix, CountsLayout, Manifest, ManifestNaming, Variable};
    pub use crate::design::{
        generate_design, ComparisonKind, ComparisonTable, DesignOutcome, DesignSpec, FilterExpr,
        RawDesign,
    };
    pub use crate::error::{AlignError, Result};
    pub use crate::ident::{default_cascade, validate_unique, IdentifierMap, Mangling, Reconciler};
    pub use crate::io::{read_table, write_table, DelimitedTable};
    pub use crate::normalize::{norm_log_cpm, LogCpmMatrix, CPM};
    pub use crate::pipeline::{Pipeline, RunConfig, RunSummary};
    pub use crate::report::{LogReporter, RecordingReporter, Reporter};
    pub use crate::results::{annotate_genes, collate_results, CollatedResults, GeneRecord};
}
