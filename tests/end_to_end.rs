use std::collections::BTreeMap;
use std::time::Duration;

use chunkbench::array::{Chunking, Coordinate, LazyArray};
use chunkbench::{
    run_from_config, BenchConfig, BenchError, CsvReporter, LocalCluster, Reporter, RunMetadata,
    RunnerConfig,
};

fn config(yaml: &str) -> BenchConfig {
    BenchConfig::from_yaml_str(yaml).unwrap()
}

#[test]
fn should_produce_full_record_per_source_and_repeat() {
    let cfg = config(
        r#"
sources:
  - type: Random
    args: {shape: [60, 4]}
    operations: {only: [TimeMean]}
  - type: Random
    args: {shape: [30, 8]}
    operations: {only: [TimeMean]}
"#,
    );
    let meta = RunMetadata::local().extra("commit", "abc123").unwrap();
    let records = run_from_config(&cfg, &RunnerConfig::new(), &meta).unwrap();

    assert_eq!(records.len(), 6);
    for r in &records {
        let columns = r.columns();
        let values = r.values();
        assert_eq!(columns.len(), 14);
        assert_eq!(columns.len(), values.len());
        assert!(values.iter().all(|v| !v.is_empty()));
        assert_eq!(r.get("commit").as_deref(), Some("abc123"));
    }
    assert_ne!(records[0].source.source_name, records[3].source.source_name);
}

#[test]
fn should_time_every_operation_against_random_source() {
    let cfg = config(
        r#"
sources:
  - type: Random
    args: {shape: [365, 50]}
"#,
    );
    let records = run_from_config(&cfg, &RunnerConfig::new(), &RunMetadata::local()).unwrap();

    assert_eq!(records.len(), 9);
    let mut per_op: BTreeMap<String, usize> = BTreeMap::new();
    for r in &records {
        *per_op.entry(r.timing.op_type.clone()).or_default() += 1;
        assert_eq!(r.source.nbytes, 365 * 50 * 8);
        assert!(r.timing.time_total + Duration::from_micros(1) >= r.timing.phase_sum());
    }
    assert_eq!(per_op.len(), 3);
    assert!(per_op.values().all(|&n| n == 3));
}

#[test]
fn should_honor_only_list() {
    let cfg = config(
        r#"
sources:
  - type: Random
    args: {shape: [365, 5]}
    chunks: [auto, {time: 73}]
    operations: {only: [TimeMean]}
"#,
    );
    let runner = RunnerConfig::new().repeats(2);
    let records = run_from_config(&cfg, &runner, &RunMetadata::local()).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.timing.op_type == "TimeMean"));
    assert_eq!(records[0].source.chunks.to_string(), "auto");
    assert_eq!(records[3].source.chunks.to_string(), "[73, -1]");
}

#[test]
fn should_benchmark_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    for year in 0..3u64 {
        let array = LazyArray::random(
            "tas",
            vec!["time".to_string(), "lat".to_string()],
            vec![365, 6],
            vec![
                Coordinate::arange("time", 365, Some("days since 2001-01-01")),
                Coordinate::arange("lat", 6, None),
            ],
            &Chunking::Auto,
            year,
        )
        .unwrap();
        array
            .to_file(dir.path().join(format!("tas_{}.chnk", 2001 + year)))
            .unwrap();
    }

    let yaml = format!(
        "sources:\n  - type: MFDataset\n    name: tas-files\n    \
         args:\n      path: {:?}\n      var: tas\n",
        dir.path().join("tas_*.chnk").display().to_string()
    );
    let runner = RunnerConfig::new().repeats(1);
    let records = run_from_config(&config(&yaml), &runner, &RunMetadata::local()).unwrap();

    assert_eq!(records.len(), 3);
    for r in &records {
        assert_eq!(r.source.source_name, "tas-files");
        assert_eq!(r.source.source_type, "MFDataset");
        assert_eq!(r.source.nbytes, 3 * 365 * 6 * 8);
    }
}

#[test]
fn should_fail_before_running_on_invalid_config() {
    let cfg = config(
        r#"
sources:
  - type: Random
    args: {shape: [10]}
    chunks: [{time: 0}]
"#,
    );
    let err = run_from_config(&cfg, &RunnerConfig::new(), &RunMetadata::local()).unwrap_err();
    assert!(matches!(err, BenchError::Config(_)));
}

#[test]
fn should_append_rows_to_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    let cfg = config(
        r#"
sources:
  - type: Random
    name: tiny
    args: {shape: [20]}
    operations: {only: [TimeMean]}
"#,
    );

    for _ in 0..2 {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let empty = file.metadata().unwrap().len() == 0;
        let reporter = CsvReporter::new(Box::new(file), empty);
        let runner = RunnerConfig::new().repeats(1);
        let records = run_from_config(&cfg, &runner, &RunMetadata::local()).unwrap();
        for r in &records {
            reporter.bench_end(r).unwrap();
        }
        reporter.suite_end(records.len(), Duration::ZERO).unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("source_name,"));
    assert!(lines[1].starts_with("tiny,Random,auto,160,TimeMean,"));
    assert!(lines[2].starts_with("tiny,"));
}

#[test]
fn should_run_inside_local_cluster() {
    let cluster = LocalCluster::with_workers(2, 1).unwrap();
    let meta = RunMetadata::local().with_cluster(&cluster);
    let cfg = config(
        r#"
sources:
  - type: Random
    args: {shape: [365, 10]}
    chunks: [{time: 50}]
    operations: {only: [ClimatologyBlocked]}
"#,
    );
    let records = cluster
        .install(|| run_from_config(&cfg, &RunnerConfig::new().repeats(1), &meta))
        .unwrap();
    cluster.close();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].meta.ncpus, 2);
    assert_eq!(records[0].meta.threads, 1);
}
