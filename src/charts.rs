//! Index of visualization configurations.
//!
//! The visualization builder writes one `*.vt.json` file per comparison
//! variable. The index lists them so a report viewer can offer each as a
//! chart.

use crate::error::Result;
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// File name of the chart index.
pub const CHART_INDEX: &str = "chart.manifest.pipeline.json";

const CONFIG_SUFFIX: &str = ".vt.json";

/// One chart in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Config file name, relative to the index.
    pub config: String,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigHeader {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

/// Build index entries for every `*.vt.json` in `dir`, sorted by file name.
pub fn index_charts<P: AsRef<Path>>(dir: P, reporter: &dyn Reporter) -> Result<Vec<ChartEntry>> {
    let mut configs: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(CONFIG_SUFFIX) && path.is_file() {
            configs.push((name.to_string(), path.clone()));
        }
    }
    configs.sort();

    configs
        .into_iter()
        .map(|(name, path)| -> Result<ChartEntry> {
            reporter.info(&format!("Adding chart {}", name));
            let header: ConfigHeader = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
            Ok(ChartEntry {
                kind: "vitessce".to_string(),
                config: name,
                name: header.name,
                desc: header.description,
            })
        })
        .collect()
}

/// Index `dir` and write [`CHART_INDEX`] into it.
pub fn write_chart_index<P: AsRef<Path>>(dir: P, reporter: &dyn Reporter) -> Result<PathBuf> {
    let entries = index_charts(&dir, reporter)?;
    let path = dir.as_ref().join(CHART_INDEX);
    let writer = BufWriter::new(File::create(&path)?);
    let mut serializer =
        serde_json::Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"    "));
    entries.serialize(&mut serializer)?;
    Ok(path)
}
