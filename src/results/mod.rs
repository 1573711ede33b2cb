//! Differential expression results: collation across methods and per-gene
//! annotation for plotting.

mod annotate;
mod collate;

pub use annotate::{
    annotate_genes, clip_zeros, scale_values, top_significant, write_gene_table, GeneRecord,
    DEFAULT_TOP_N,
};
pub use collate::{
    canonical_column, collate_results, neg_log10_floored, parse_result_name, CollatedResults,
    COLLATED_RESULTS,
};
