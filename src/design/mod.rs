//! Comparison designs: specification, row filters and table generation.

mod filter;
mod generator;
mod spec;

pub use filter::{CmpOp, Expr, FilterExpr, Operand};
pub use generator::{
    classify, generate_design, Classification, ComparisonKind, ComparisonTable, DesignGenerator,
    DesignOutcome, BASE_MANIFEST,
};
pub use spec::{DesignSpec, RawDesign};
