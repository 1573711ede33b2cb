//! Field delimiter detection based on file extension.

use crate::error::{AlignError, Result};
use std::path::Path;

/// Compression suffix tolerated after the table extension.
const COMPRESSION_SUFFIX: &str = ".gz";

/// Field delimiter of a delimited table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    /// The delimiter as a single byte, as expected by the `csv` crate.
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }
}

/// Layout of a table file: its delimiter and whether it is gzip-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFormat {
    pub delimiter: Delimiter,
    pub compressed: bool,
}

/// Determine the table format of a path.
///
/// One trailing `.gz` is stripped before the extension is inspected:
/// `.csv` is comma separated, `.tsv` is tab separated, anything else fails
/// with [`AlignError::UnrecognizedFormat`].
pub fn sniff_format<P: AsRef<Path>>(path: P) -> Result<TableFormat> {
    let name = path.as_ref().to_string_lossy();
    let (stem, compressed) = match name.strip_suffix(COMPRESSION_SUFFIX) {
        Some(stem) => (stem, true),
        None => (&name[..], false),
    };

    let delimiter = if stem.ends_with(".csv") {
        Delimiter::Comma
    } else if stem.ends_with(".tsv") {
        Delimiter::Tab
    } else {
        let extension = stem.rsplit('.').next().unwrap_or_default();
        return Err(AlignError::UnrecognizedFormat {
            extension: extension.to_string(),
        });
    };

    Ok(TableFormat {
        delimiter,
        compressed,
    })
}

/// Determine only the delimiter of a path.
pub fn sniff_delimiter<P: AsRef<Path>>(path: P) -> Result<Delimiter> {
    sniff_format(path).map(|f| f.delimiter)
}
