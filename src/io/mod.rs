//! Delimited table input and output.
//!
//! - **format**: delimiter detection from file extensions
//! - **table**: reading and writing raw delimited tables, gzip aware

mod format;
mod table;

pub use format::{sniff_delimiter, sniff_format, Delimiter, TableFormat};
pub use table::{open_reader, read_table, write_table, DelimitedTable};
