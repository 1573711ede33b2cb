//! Pipeline runner: load, reconcile, align, snapshot and design in one pass.

use crate::align::{reconcile_and_align, AlignPolicy, AlignedTables};
use crate::data::{CountMatrix, CountsLayout, Manifest, ManifestNaming};
use crate::design::{generate_design, DesignOutcome, DesignSpec, RawDesign};
use crate::error::{AlignError, Result};
use crate::ident::{default_cascade, validate_unique, Mangling, Reconciler};
use crate::normalize::norm_log_cpm;
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A full run, as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the run, used in log messages.
    #[serde(default = "default_name")]
    pub name: String,
    /// Manifest file (CSV/TSV, optionally gzipped).
    pub manifest: PathBuf,
    /// Counts file (CSV/TSV, optionally gzipped).
    pub counts: PathBuf,
    #[serde(default)]
    pub counts_layout: CountsLayout,
    #[serde(default)]
    pub manifest_naming: ManifestNaming,
    #[serde(default)]
    pub align_policy: AlignPolicy,
    /// Transforms tried, in order, when matching counts headers.
    #[serde(default = "default_cascade")]
    pub cascade: Vec<Mangling>,
    /// Comparison design; omit to stop after the snapshot.
    #[serde(default)]
    pub design: Option<RawDesign>,
    /// Write `counts.log_cpm.csv` with this scale factor.
    #[serde(default)]
    pub log_cpm_scale: Option<f64>,
    /// Directory receiving every output.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_name() -> String {
    "specimen-align".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl RunConfig {
    /// Minimal configuration with defaults for everything optional.
    pub fn new<P: AsRef<Path>>(manifest: P, counts: P) -> Self {
        Self {
            name: default_name(),
            manifest: manifest.as_ref().to_path_buf(),
            counts: counts.as_ref().to_path_buf(),
            counts_layout: CountsLayout::default(),
            manifest_naming: ManifestNaming::default(),
            align_policy: AlignPolicy::default(),
            cascade: default_cascade(),
            design: None,
            log_cpm_scale: None,
            output_dir: default_output_dir(),
        }
    }

    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(AlignError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(AlignError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}

/// What a run did, for logging or JSON output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub manifest_specimens: usize,
    pub counts_columns: usize,
    /// `(original, resolved)` for every renamed counts header.
    pub renamed: Vec<(String, String)>,
    /// Manifest specimens dropped under the lenient policy.
    pub dropped: Vec<String>,
    pub aligned_specimens: usize,
    pub features: usize,
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(AlignError::from)
    }
}

/// Stem used for `validated.<stem>.csv`: the file name without its
/// compression suffix and extension.
pub fn manifest_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Executes a [`RunConfig`].
pub struct Pipeline<'a> {
    config: RunConfig,
    reporter: &'a dyn Reporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: RunConfig, reporter: &'a dyn Reporter) -> Self {
        Self { config, reporter }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load both inputs. Manifest identifiers and counts headers are checked
    /// for duplicates here.
    pub fn load(&self) -> Result<(Manifest, CountMatrix)> {
        let manifest = Manifest::from_path_with_naming(
            &self.config.manifest,
            self.config.manifest_naming,
            self.reporter,
        )?;
        self.reporter
            .info(&format!("Reading in {}", self.config.counts.display()));
        let counts = CountMatrix::from_path(&self.config.counts, self.config.counts_layout)?;
        validate_unique(counts.sample_ids())?;
        self.reporter.info(&format!(
            "Read in {} features x {} specimens",
            counts.n_features(),
            counts.n_samples()
        ));
        Ok((manifest, counts))
    }

    /// Reconcile and align loaded inputs.
    pub fn align(&self, manifest: &Manifest, counts: &CountMatrix, summary: &mut RunSummary) -> Result<AlignedTables> {
        let reconciler = Reconciler::new(self.config.cascade.clone());
        let (map, aligned) = reconcile_and_align(
            manifest,
            counts,
            &reconciler,
            self.config.align_policy,
            self.reporter,
        )?;

        summary.renamed = map
            .renamed()
            .map(|r| (r.original.clone(), r.resolved.clone()))
            .collect();
        summary.dropped = manifest
            .sample_ids()
            .iter()
            .filter(|id| !aligned.manifest.has_sample(id))
            .cloned()
            .collect();
        summary.aligned_specimens = aligned.manifest.n_samples();
        summary.features = aligned.counts.n_features();
        Ok(aligned)
    }

    /// Validate the configured design, if any.
    pub fn design_spec(&self) -> Result<Option<DesignSpec>> {
        self.config.design.as_ref().map(RawDesign::parse).transpose()
    }

    /// Generate the comparison design from the aligned manifest.
    pub fn design(&self, aligned: &AlignedTables, spec: &DesignSpec) -> Result<DesignOutcome> {
        generate_design(&aligned.manifest, spec, self.reporter)
    }

    /// Run every stage and write all outputs.
    ///
    /// The design is validated before any input is read, and fully generated
    /// before anything besides the snapshot is written.
    pub fn run(&self) -> Result<RunSummary> {
        let out = &self.config.output_dir;
        self.reporter
            .info(&format!("Running {}", self.config.name));
        let spec = self.design_spec()?;

        let mut summary = RunSummary {
            name: self.config.name.clone(),
            ..Default::default()
        };

        let (manifest, counts) = self.load()?;
        summary.manifest_specimens = manifest.n_samples();
        summary.counts_columns = counts.n_samples();

        let aligned = self.align(&manifest, &counts, &mut summary)?;
        let snapshot = aligned.write(out, &manifest_stem(&self.config.manifest))?;
        self.reporter.info(&format!(
            "Wrote {} and {}",
            snapshot.counts.display(),
            snapshot.manifest.display()
        ));
        summary.written.push(snapshot.counts);
        summary.written.push(snapshot.manifest);

        if let Some(scale) = self.config.log_cpm_scale {
            let path = out.join("counts.log_cpm.csv");
            norm_log_cpm(&aligned.counts, scale)?.to_csv(&path)?;
            summary.written.push(path);
        }

        if let Some(spec) = &spec {
            let outcome = self.design(&aligned, spec)?;
            summary
                .written
                .extend(outcome.write_all(out, self.reporter)?);
        }

        self.reporter.info("Done");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;
    use std::fs;

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let manifest = dir.join("samples.tsv");
        fs::write(
            &manifest,
            "sample\tcond\tbatch\n1A\tcase\tA\n2B\tcase\tB\n3C\tcontrol\tA\n",
        )
        .unwrap();
        let counts = dir.join("counts.tsv.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(fs::File::create(&counts).unwrap(), Default::default());
        std::io::Write::write_all(
            &mut encoder,
            b"gene_id\tX1A\t2.B\t3C\tblank\nENSG1\t10\t0\t5\t1\nENSG2\t3\t8\t2\t0\n",
        )
        .unwrap();
        encoder.finish().unwrap();
        (manifest, counts)
    }

    #[test]
    fn test_manifest_stem() {
        assert_eq!(manifest_stem(Path::new("in/samples.csv")), "samples");
        assert_eq!(manifest_stem(Path::new("samples.v2.tsv.gz")), "samples.v2");
        assert_eq!(manifest_stem(Path::new("manifest")), "manifest");
    }

    #[test]
    fn test_config_yaml() {
        let yaml = r#"
name: demo
manifest: samples.csv
counts: salmon.merged.gene_counts.tsv
counts_layout: salmon
align_policy: lenient
design:
  comparison_column: cond
  reference_value: control
  grouping_columns: batch
"#;
        let config = RunConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.counts_layout, CountsLayout::SalmonMergedGeneCounts);
        assert_eq!(config.align_policy, AlignPolicy::Lenient);
        assert_eq!(config.cascade, default_cascade());
        assert_eq!(config.output_dir, PathBuf::from("."));

        let parsed = RunConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed.design, config.design);
        assert_eq!(parsed.name, "demo");
    }

    #[test]
    fn test_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, counts) = write_inputs(dir.path());

        let mut config = RunConfig::new(&manifest, &counts);
        config.output_dir = dir.path().join("out");
        config.log_cpm_scale = Some(1e6);
        config.design = Some(RawDesign {
            comparison_column: "cond".to_string(),
            reference_value: "control".to_string(),
            ..Default::default()
        });

        let reporter = RecordingReporter::new();
        let summary = Pipeline::new(config, &reporter).run().unwrap();

        assert_eq!(summary.manifest_specimens, 3);
        assert_eq!(summary.counts_columns, 4);
        assert_eq!(summary.aligned_specimens, 3);
        assert_eq!(summary.renamed.len(), 2);
        assert!(summary.dropped.is_empty());

        let out = dir.path().join("out");
        let names: Vec<_> = summary
            .written
            .iter()
            .map(|p| p.strip_prefix(&out).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "counts.csv",
                "validated.samples.csv",
                "counts.log_cpm.csv",
                "manifest.csv",
                "case.categorical.manifest.csv"
            ]
        );

        let aligned = CountMatrix::from_path(out.join("counts.csv"), CountsLayout::Plain).unwrap();
        assert_eq!(aligned.sample_ids(), &["1A", "2B", "3C"]);
        assert_eq!(aligned.get(1, 1), 8.0);

        let design = Manifest::from_path(out.join("case.categorical.manifest.csv")).unwrap();
        assert_eq!(design.column_names(), &["batch", "case"]);
    }

    #[test]
    fn test_strict_run_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, _) = write_inputs(dir.path());
        let counts = dir.path().join("partial.csv");
        fs::write(&counts, "gene_id,1A\nENSG1,4\n").unwrap();

        let mut config = RunConfig::new(&manifest, &counts);
        config.output_dir = dir.path().join("out");
        let reporter = RecordingReporter::new();
        match Pipeline::new(config, &reporter).run() {
            Err(AlignError::MissingSpecimens(ids)) => assert_eq!(ids, vec!["2B", "3C"]),
            other => panic!("expected MissingSpecimens, got {:?}", other),
        }
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_invalid_design_fails_before_reading_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let (manifest, counts) = write_inputs(dir.path());

        let mut config = RunConfig::new(&manifest, &counts);
        config.output_dir = dir.path().join("out");
        config.design = Some(RawDesign {
            comparison_column: "body site".to_string(),
            ..Default::default()
        });

        let reporter = RecordingReporter::new();
        assert!(matches!(
            Pipeline::new(config, &reporter).run(),
            Err(AlignError::InvalidSpecification(_))
        ));
        assert!(!dir.path().join("out").exists());
        assert!(!reporter.infos().iter().any(|m| m.starts_with("Reading in")));
    }

    #[test]
    fn test_summary_json() {
        let summary = RunSummary {
            name: "demo".to_string(),
            dropped: vec!["S9".to_string()],
            ..Default::default()
        };
        let json = summary.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["dropped"][0], "S9");
    }
}
