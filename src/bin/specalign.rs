//! specalign - specimen manifest and count matrix alignment CLI
//!
//! Command-line interface for reconciling specimen identifiers, writing
//! aligned snapshots and generating comparison design tables.

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use specimen_align::align::{reconcile_and_align, AlignPolicy};
use specimen_align::charts::write_chart_index;
use specimen_align::data::{CountMatrix, CountsLayout, Manifest, ManifestNaming};
use specimen_align::design::{generate_design, RawDesign};
use specimen_align::error::Result;
use specimen_align::ident::{default_cascade, validate_unique, Reconciler};
use specimen_align::normalize::{norm_log_cpm, CPM};
use specimen_align::pipeline::{manifest_stem, Pipeline, RunConfig};
use specimen_align::report::LogReporter;
use specimen_align::results::{
    annotate_genes, collate_results, write_gene_table, CollatedResults, COLLATED_RESULTS,
    DEFAULT_TOP_N,
};
use std::path::PathBuf;

/// CLI-friendly counts layout
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLayout {
    /// First column holds feature ids, remaining columns are specimens
    Plain,
    /// salmon merged gene counts (gene_id and gene_name leading columns)
    Salmon,
}

impl From<CliLayout> for CountsLayout {
    fn from(layout: CliLayout) -> Self {
        match layout {
            CliLayout::Plain => CountsLayout::Plain,
            CliLayout::Salmon => CountsLayout::SalmonMergedGeneCounts,
        }
    }
}

/// CLI-friendly manifest identifier naming
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliNaming {
    /// Keep identifiers as written
    Verbatim,
    /// Rewrite identifiers the way R sanitizes column names
    Sanitized,
    /// Prefix X to identifiers starting with a digit
    DigitPrefixed,
}

impl From<CliNaming> for ManifestNaming {
    fn from(naming: CliNaming) -> Self {
        match naming {
            CliNaming::Verbatim => ManifestNaming::Verbatim,
            CliNaming::Sanitized => ManifestNaming::Sanitized,
            CliNaming::DigitPrefixed => ManifestNaming::DigitPrefixed,
        }
    }
}

/// CLI-friendly alignment policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPolicy {
    /// Fail when a manifest specimen has no counts column
    Strict,
    /// Drop such specimens with a warning
    Lenient,
}

impl From<CliPolicy> for AlignPolicy {
    fn from(policy: CliPolicy) -> Self {
        match policy {
            CliPolicy::Strict => AlignPolicy::Strict,
            CliPolicy::Lenient => AlignPolicy::Lenient,
        }
    }
}

/// Specimen manifest alignment and comparison design generation
#[derive(Parser)]
#[command(name = "specalign")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage from a YAML configuration file
    Run {
        /// Path to run configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Reconcile specimen identifiers and write an aligned snapshot
    Align {
        /// Path to the specimen manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Path to the count matrix
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Layout of the count matrix
        #[arg(long, value_enum, default_value = "plain")]
        layout: CliLayout,

        /// Rewrite manifest identifiers on load
        #[arg(long, value_enum, default_value = "verbatim")]
        naming: CliNaming,

        /// What to do with specimens missing from the counts
        #[arg(long, value_enum, default_value = "strict")]
        policy: CliPolicy,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Generate comparison design tables from a manifest
    Design {
        /// Path to the specimen manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Column holding the variable of interest
        #[arg(long)]
        comparison: String,

        /// Reference level (categorical comparisons only)
        #[arg(long, default_value = "")]
        reference: String,

        /// Comma-separated grouping columns
        #[arg(long, default_value = "")]
        groups: String,

        /// Row filter, e.g. "tissue == 'liver' and age > 30"
        #[arg(long, default_value = "")]
        filter: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Write log counts-per-million for a count matrix
    Normalize {
        /// Path to the count matrix
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Layout of the count matrix
        #[arg(long, value_enum, default_value = "plain")]
        layout: CliLayout,

        /// Multiplier applied to proportions before the log
        #[arg(long, default_value_t = CPM)]
        scale: f64,

        /// Output path for the scaled matrix
        #[arg(short, long, default_value = "counts.log_cpm.csv")]
        output: PathBuf,
    },

    /// Collate <variable>.<method>.csv result tables
    Collate {
        /// Result files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output path for the collated table
        #[arg(short, long, default_value = COLLATED_RESULTS)]
        output: PathBuf,
    },

    /// Annotate collated results with plotting columns
    Annotate {
        /// Path to the collated results
        #[arg(short, long, default_value = COLLATED_RESULTS)]
        results: PathBuf,

        /// Variable to annotate (all variables when omitted)
        #[arg(long)]
        variable: Option<String>,

        /// Aligned count matrix supplying mean abundances
        #[arg(short = 'c', long)]
        counts: Option<PathBuf>,

        /// Number of genes flagged as top significant
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Index *.vt.json chart configurations in a directory
    Charts {
        /// Directory holding the chart configurations
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Generate an example run configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "specalign.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run { config, json } => cmd_run(&config, json),

        Commands::Align {
            manifest,
            counts,
            layout,
            naming,
            policy,
            output,
        } => cmd_align(
            &manifest,
            &counts,
            layout.into(),
            naming.into(),
            policy.into(),
            &output,
        ),

        Commands::Design {
            manifest,
            comparison,
            reference,
            groups,
            filter,
            output,
        } => cmd_design(
            &manifest,
            RawDesign {
                comparison_column: comparison,
                reference_value: reference,
                grouping_columns: groups,
                filter,
            },
            &output,
        ),

        Commands::Normalize {
            counts,
            layout,
            scale,
            output,
        } => cmd_normalize(&counts, layout.into(), scale, &output),

        Commands::Collate { files, output } => cmd_collate(&files, &output),

        Commands::Annotate {
            results,
            variable,
            counts,
            top_n,
            output,
        } => cmd_annotate(&results, variable.as_deref(), counts.as_ref(), top_n, &output),

        Commands::Charts { dir } => cmd_charts(&dir),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run every stage from configuration
fn cmd_run(config_path: &PathBuf, json: bool) -> Result<()> {
    log::info!("Loading run configuration from {:?}", config_path);
    let config = RunConfig::from_file(config_path)?;

    let reporter = LogReporter::default();
    let summary = Pipeline::new(config, &reporter).run()?;

    if json {
        println!("{}", summary.to_json()?);
    } else {
        eprintln!(
            "Aligned {} of {} specimens across {} features",
            summary.aligned_specimens, summary.manifest_specimens, summary.features
        );
        for path in &summary.written {
            eprintln!("  wrote {}", path.display());
        }
    }
    Ok(())
}

/// Reconcile and write the aligned snapshot
fn cmd_align(
    manifest_path: &PathBuf,
    counts_path: &PathBuf,
    layout: CountsLayout,
    naming: ManifestNaming,
    policy: AlignPolicy,
    output: &PathBuf,
) -> Result<()> {
    let reporter = LogReporter::default();
    let manifest = Manifest::from_path_with_naming(manifest_path, naming, &reporter)?;
    let counts = CountMatrix::from_path(counts_path, layout)?;
    validate_unique(counts.sample_ids())?;

    let reconciler = Reconciler::new(default_cascade());
    let (map, aligned) = reconcile_and_align(&manifest, &counts, &reconciler, policy, &reporter)?;
    let snapshot = aligned.write(output, &manifest_stem(manifest_path))?;

    eprintln!(
        "Aligned {} specimens ({} headers renamed)",
        aligned.manifest.n_samples(),
        map.renamed().count()
    );
    eprintln!("  wrote {}", snapshot.counts.display());
    eprintln!("  wrote {}", snapshot.manifest.display());
    Ok(())
}

/// Generate comparison design tables
fn cmd_design(manifest_path: &PathBuf, raw: RawDesign, output: &PathBuf) -> Result<()> {
    let spec = raw.parse()?;
    let manifest = Manifest::from_path(manifest_path)?;

    let reporter = LogReporter::default();
    let outcome = generate_design(&manifest, &spec, &reporter)?;
    for path in outcome.write_all(output, &reporter)? {
        eprintln!("  wrote {}", path.display());
    }
    Ok(())
}

/// Write log-CPM scaled counts
fn cmd_normalize(counts_path: &PathBuf, layout: CountsLayout, scale: f64, output: &PathBuf) -> Result<()> {
    let counts = CountMatrix::from_path(counts_path, layout)?;
    log::info!(
        "Loaded {} features x {} specimens",
        counts.n_features(),
        counts.n_samples()
    );
    norm_log_cpm(&counts, scale)?.to_csv(output)?;
    eprintln!("Wrote {}", output.display());
    Ok(())
}

/// Collate per-method result tables
fn cmd_collate(files: &[PathBuf], output: &PathBuf) -> Result<()> {
    let reporter = LogReporter::default();
    let collated = collate_results(files, &reporter)?;
    collated.write(output)?;
    eprintln!("Wrote {} rows to {}", collated.n_rows(), output.display());
    Ok(())
}

/// Annotate collated results per variable
fn cmd_annotate(
    results_path: &PathBuf,
    variable: Option<&str>,
    counts_path: Option<&PathBuf>,
    top_n: usize,
    output: &PathBuf,
) -> Result<()> {
    let results = CollatedResults::from_path(results_path)?;
    let log_cpm = match counts_path {
        Some(path) => Some(norm_log_cpm(
            &CountMatrix::from_path(path, CountsLayout::Plain)?,
            CPM,
        )?),
        None => None,
    };

    let variables = match variable {
        Some(v) => vec![v.to_string()],
        None => results.variables()?,
    };

    std::fs::create_dir_all(output)?;
    for variable in &variables {
        let genes = annotate_genes(&results, variable, log_cpm.as_ref(), top_n)?;
        let path = write_gene_table(output, variable, &genes)?;
        eprintln!("  wrote {} ({} genes)", path.display(), genes.len());
    }
    Ok(())
}

/// Write the chart index
fn cmd_charts(dir: &PathBuf) -> Result<()> {
    let reporter = LogReporter::default();
    let path = write_chart_index(dir, &reporter)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let mut config = RunConfig::new("samplesheet.csv", "salmon.merged.gene_counts.tsv");
    config.name = "example-align".to_string();
    config.counts_layout = CountsLayout::SalmonMergedGeneCounts;
    config.log_cpm_scale = Some(CPM);
    config.output_dir = PathBuf::from("aligned");
    config.design = Some(RawDesign {
        comparison_column: "condition".to_string(),
        reference_value: "control".to_string(),
        grouping_columns: "batch".to_string(),
        filter: String::new(),
    });
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
