//! Integration tests: reconciliation, alignment and design generation on
//! files written to disk.

use specimen_align::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn manifest_with(dir: &TempDir, column: &str, values: &[&str]) -> Manifest {
    let mut text = format!("sample,{},batch\n", column);
    for (i, value) in values.iter().enumerate() {
        text.push_str(&format!("S{},{},b{}\n", i + 1, value, i % 2));
    }
    Manifest::from_path(write(dir.path(), "samples.csv", &text)).unwrap()
}

#[test]
fn test_mangled_headers_are_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::from_path(write(
        dir.path(),
        "samples.csv",
        "sample,cond\n1A,case\n2B,case\n3C,control\n",
    ))
    .unwrap();
    let counts = CountMatrix::from_path(
        write(dir.path(), "counts.tsv", "gene_id\tX1A\t2.B\t3C\ng1\t1\t2\t3\ng2\t4\t5\t6\n"),
        CountsLayout::Plain,
    )
    .unwrap();

    let reporter = RecordingReporter::new();
    let reconciler = Reconciler::new(default_cascade());
    let (map, aligned) =
        reconcile_and_align(&manifest, &counts, &reconciler, AlignPolicy::Strict, &reporter).unwrap();

    assert_eq!(map.resolved_labels(), vec!["1A", "2B", "3C"]);
    assert_eq!(aligned.counts.sample_ids(), &["1A", "2B", "3C"]);
    assert_eq!(aligned.counts.get(1, 1), 5.0);
    // both renames need the fuzzy step
    assert_eq!(reporter.warnings().len(), 2);
}

#[test]
fn test_strict_alignment_names_missing_specimens() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::from_path(write(dir.path(), "samples.csv", "sample,cond\nS1,a\nS2,b\n")).unwrap();
    let counts = CountMatrix::from_path(
        write(dir.path(), "counts.csv", "gene_id,S1\ng1,7\n"),
        CountsLayout::Plain,
    )
    .unwrap();

    let reporter = RecordingReporter::new();
    let reconciler = Reconciler::new(default_cascade());
    match reconcile_and_align(&manifest, &counts, &reconciler, AlignPolicy::Strict, &reporter) {
        Err(AlignError::MissingSpecimens(ids)) => assert_eq!(ids, vec!["S2"]),
        other => panic!("expected MissingSpecimens, got {:?}", other.err()),
    }

    let reporter = RecordingReporter::new();
    let (_, aligned) =
        reconcile_and_align(&manifest, &counts, &reconciler, AlignPolicy::Lenient, &reporter).unwrap();
    assert_eq!(aligned.manifest.sample_ids(), &["S1"]);
    assert_eq!(reporter.warnings().len(), 1);
}

#[test]
fn test_numeric_comparison_gives_continuous_table() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_with(&dir, "dose", &["1.0", "2.0", "3.0"]);
    let spec = DesignSpec::new("dose", None, &[], None).unwrap();

    let reporter = RecordingReporter::new();
    let outcome = generate_design(&manifest, &spec, &reporter).unwrap();

    assert_eq!(outcome.tables.len(), 1);
    let table = &outcome.tables[0];
    assert!(matches!(table.kind(), ComparisonKind::Continuous { column } if column == "dose"));
    assert_eq!(table.file_name(), "dose.continuous.manifest.csv");
    assert_eq!(table.manifest().get("S3", "dose"), Some(&Variable::Continuous(3.0)));
}

#[test]
fn test_single_level_gives_one_binary_table() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_with(&dir, "cond", &["case", "case", "control"]);
    let spec = DesignSpec::new("cond", Some("control"), &[], None).unwrap();

    let reporter = RecordingReporter::new();
    let outcome = generate_design(&manifest, &spec, &reporter).unwrap();

    assert_eq!(outcome.tables.len(), 1);
    let table = &outcome.tables[0];
    assert_eq!(table.file_name(), "case.categorical.manifest.csv");
    let indicator: Vec<_> = table.manifest().column("case").unwrap().into_iter().cloned().collect();
    assert_eq!(
        indicator,
        vec![Variable::Binary(1), Variable::Binary(1), Variable::Binary(0)]
    );
    assert!(!table.manifest().has_column("cond"));
}

#[test]
fn test_each_level_gets_its_own_table() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_with(&dir, "cond", &["a", "b", "control"]);
    let spec = DesignSpec::new("cond", Some("control"), &[], None).unwrap();

    let reporter = RecordingReporter::new();
    let outcome = generate_design(&manifest, &spec, &reporter).unwrap();

    let names: Vec<String> = outcome.tables.iter().map(|t| t.file_name()).collect();
    assert_eq!(names, vec!["a.categorical.manifest.csv", "b.categorical.manifest.csv"]);
    for table in &outcome.tables {
        assert_eq!(table.manifest().n_samples(), 2);
    }
    assert_eq!(outcome.tables[1].manifest().sample_ids(), &["S2", "S3"]);

    let out = dir.path().join("design");
    let written = outcome.write_all(&out, &reporter).unwrap();
    assert_eq!(written[0], out.join("manifest.csv"));
    let reloaded = Manifest::from_path(out.join("a.categorical.manifest.csv")).unwrap();
    assert_eq!(reloaded.column_names(), &["batch", "a"]);
    assert_eq!(reloaded.get("S1", "a"), Some(&Variable::Categorical("1".to_string())));
}

#[test]
fn test_restrictive_filter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = manifest_with(&dir, "cond", &["a", "b", "control"]);
    let spec = DesignSpec::new("cond", Some("control"), &[], Some("cond == 'a'")).unwrap();

    let reporter = RecordingReporter::new();
    match generate_design(&manifest, &spec, &reporter) {
        Err(AlignError::FilterTooRestrictive { remaining, .. }) => assert_eq!(remaining, 1),
        other => panic!("expected FilterTooRestrictive, got {:?}", other.err()),
    }
}

#[test]
fn test_configured_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "samplesheet.csv",
        "sample,condition,batch\nctl-1,control,A\nctl-2,control,B\nko-1,knockout,A\nko-2,knockout,B\n",
    );
    write(
        dir.path(),
        "salmon.merged.gene_counts.tsv",
        "gene_id\tgene_name\tctl.1\tctl.2\tko.1\tko.2\n\
         ENSG1\tA1BG\t10\t12\t30\t28\n\
         ENSG2\tA2M\t5\t4\t1\t0\n",
    );
    let config = format!(
        r#"
name: knockout
manifest: {dir}/samplesheet.csv
counts: {dir}/salmon.merged.gene_counts.tsv
counts_layout: salmon
manifest_naming: sanitized
output_dir: {dir}/out
log_cpm_scale: 1000000.0
design:
  comparison_column: condition
  reference_value: control
  grouping_columns: batch
  filter: "batch in ['A', 'B']"
"#,
        dir = dir.path().display()
    );
    let config_path = write(dir.path(), "run.yaml", &config);

    let reporter = RecordingReporter::new();
    let summary = Pipeline::new(RunConfig::from_file(&config_path).unwrap(), &reporter)
        .run()
        .unwrap();

    assert_eq!(summary.aligned_specimens, 4);
    assert_eq!(summary.features, 2);
    assert!(summary.renamed.is_empty());

    let out = dir.path().join("out");
    for name in [
        "counts.csv",
        "validated.samplesheet.csv",
        "counts.log_cpm.csv",
        "manifest.csv",
        "knockout.categorical.manifest.csv",
    ] {
        assert!(out.join(name).exists(), "missing {}", name);
    }

    let counts = CountMatrix::from_path(out.join("counts.csv"), CountsLayout::Plain).unwrap();
    assert_eq!(counts.sample_ids(), &["ctl.1", "ctl.2", "ko.1", "ko.2"]);
    assert_eq!(counts.feature_ids(), &["ENSG1", "ENSG2"]);
}

#[test]
fn test_results_collate_and_annotate() {
    let dir = tempfile::tempdir().unwrap();
    let deseq = write(
        dir.path(),
        "knockout.DESeq2.csv",
        ",log2FoldChange,pvalue,QValue\nENSG1,1.4,0.0001,0.001\nENSG2,-2.0,0.02,0.04\n",
    );
    let edger = write(
        dir.path(),
        "knockout.edgeR.csv",
        "gene_id,logFC,PValue,QValue\nENSG1,1.3,0.0002,0.002\n",
    );

    let reporter = RecordingReporter::new();
    let collated = collate_results(&[deseq, edger], &reporter).unwrap();
    assert_eq!(collated.n_rows(), 3);
    assert_eq!(collated.variables().unwrap(), vec!["knockout"]);

    let path = dir.path().join("DE_results.csv");
    collated.write(&path).unwrap();
    let reloaded = CollatedResults::from_path(&path).unwrap();
    assert_eq!(reloaded, collated);

    let genes = annotate_genes(&reloaded, "knockout", None, 1).unwrap();
    let methods: Vec<&str> = genes.iter().map(|g| g.method.as_str()).collect();
    assert_eq!(methods, vec!["DESeq2", "DESeq2", "edgeR"]);
    let flags: Vec<u8> = genes.iter().map(|g| g.top_significant).collect();
    assert_eq!(flags, vec![1, 0, 0]);
}
