use std::fs;
use std::path::{Path, PathBuf};

use pageviews::{count_sequential, run, Isolation, Pipeline, PipelineConfig, PipelineError, StoreKind};
use serde_json::{json, Value};
use tempfile::TempDir;

const SCENARIO: &str = "http://a.com/x,2024-01-01,ref1\nhttp://a.com/x,2024-01-01,ref2\nhttp://b.com/y,2024-01-02,ref3\n";

fn write_input(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Deterministic visit log with a handful of paths, dates and schemes.
fn synthetic_log(lines: usize) -> String {
    let paths = ["/", "/blog", "/blog/rust-2024", "/about", "/docs/a/b", "/search?q=x"];
    let hosts = ["http://example.com", "https://example.com", "https://a.io"];
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut out = String::new();
    for i in 0..lines {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let path = paths[(state % paths.len() as u64) as usize];
        let host = hosts[((state >> 8) % hosts.len() as u64) as usize];
        let day = 1 + (state >> 16) % 28;
        let month = 1 + (state >> 24) % 3;
        out.push_str(&format!("{}{},2025-{:02}-{:02}T10:{:02}:00+00:00,ref{}\n", host, path, month, day, i % 60, i));
    }
    out
}

#[test]
fn scenario_is_independent_of_partition_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    for workers in 1..=6 {
        let output = dir.path().join(format!("out-{}.json", workers));
        run(&input, &output, workers).unwrap();
        assert_eq!(read_json(&output), json!({"/x": {"2024-01-01": 2}, "/y": {"2024-01-02": 1}}), "workers={}", workers);
    }
}

#[test]
fn identical_lines_spanning_a_boundary_are_summed() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", &"https://a.com/same,2024-06-01,r\n".repeat(101));
    let output = dir.path().join("out.json");
    let report = run(&input, &output, 4).unwrap();
    // every partition saw the pair, the merge must add them up
    assert!(report.workers.iter().filter(|w| w.pairs > 0).count() > 1);
    assert_eq!(read_json(&output), json!({"/same": {"2024-06-01": 101}}));
}

#[test]
fn partition_count_does_not_change_counts() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", &synthetic_log(2_000));
    let reference = count_sequential(&input).unwrap();
    assert_eq!(reference.total(), 2_000);
    let reference_json = serde_json::to_value(reference.into_sorted()).unwrap();
    for workers in [1, 2, 3, 7, 16] {
        let output = dir.path().join(format!("out-{}.json", workers));
        let report = run(&input, &output, workers).unwrap();
        assert_eq!(report.stats.scan.lines_read, 2_000);
        assert_eq!(report.stats.scan.bytes_scanned, report.stats.file_size);
        assert_eq!(read_json(&output), reference_json, "workers={}", workers);
    }
}

#[test]
fn reruns_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", &synthetic_log(500));
    let output = dir.path().join("out.json");
    run(&input, &output, 3).unwrap();
    let first = fs::read(&output).unwrap();
    run(&input, &output, 3).unwrap();
    assert_eq!(first, fs::read(&output).unwrap());
}

#[test]
fn dates_are_sorted_within_each_url() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", &synthetic_log(800));
    let output = dir.path().join("out.json");
    run(&input, &output, 4).unwrap();
    // serde_json without preserve_order sorts keys itself, so check the raw text
    let text = fs::read_to_string(&output).unwrap();
    let mut last: Option<String> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.ends_with('{') {
            last = None;
        } else if trimmed.starts_with("\"2025-") {
            let date = trimmed.split('"').nth(1).unwrap().to_string();
            if let Some(prev) = &last {
                assert!(prev.as_str() <= date.as_str(), "{} after {}", date, prev);
            }
            last = Some(date);
        }
    }
}

#[test]
fn malformed_lines_are_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let contents = "http://a.com/x,2024-01-01,ref1\nthis line has no comma\nhttp://a.com/x,2024-01-01,ref2\n";
    let input = write_input(&dir, "visits.csv", contents);
    let output = dir.path().join("out.json");
    let report = run(&input, &output, 2).unwrap();
    assert_eq!(report.lines_skipped(), 1);
    assert_eq!(read_json(&output), json!({"/x": {"2024-01-01": 2}}));
}

#[test]
fn more_partitions_than_lines() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = dir.path().join("out.json");
    let report = run(&input, &output, 32).unwrap();
    assert_eq!(report.partitions.len(), 32);
    let empty = report.workers.iter().filter(|w| w.lines_read == 0).count();
    assert!(empty >= 29);
    assert_eq!(report.stats.merge.visits, 3);
}

#[test]
fn empty_input_writes_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", "");
    let output = dir.path().join("out.json");
    run(&input, &output, 2).unwrap();
    assert_eq!(fs::read(&output).unwrap(), b"{}\n");
}

#[test]
fn intermediate_artifacts_are_removed_unless_kept() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = dir.path().join("out.json");

    run(&input, &output, 3).unwrap();
    for i in 0..3 {
        assert!(!dir.path().join(format!("out.json.{}", i)).exists());
    }

    let cfg = PipelineConfig::default().with_workers(3).keep_intermediates(true);
    Pipeline::new(cfg).run(&input, &output).unwrap();
    for i in 0..3 {
        assert!(dir.path().join(format!("out.json.{}", i)).exists());
    }
}

#[test]
fn memory_store_leaves_no_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = dir.path().join("out.json");
    let cfg = PipelineConfig::default().with_workers(3).with_store(StoreKind::Memory);
    Pipeline::new(cfg).run(&input, &output).unwrap();
    let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names.len(), 2, "{:?}", names);
}

#[test]
fn existing_output_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = write_input(&dir, "out.json", "stale contents that are much longer than the new output will be ...........");
    run(&input, &output, 2).unwrap();
    assert_eq!(read_json(&output), json!({"/x": {"2024-01-01": 2}, "/y": {"2024-01-02": 1}}));
}

fn with_worker_program(program: &str) -> Pipeline {
    Pipeline::new(
        PipelineConfig::default()
            .with_workers(2)
            .with_isolation(Isolation::Processes { program: PathBuf::from(program) }),
    )
}

#[cfg(unix)]
#[test]
fn failing_worker_process_fails_run_and_keeps_old_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = write_input(&dir, "out.json", "OLD");
    let err = with_worker_program("/bin/false").run(&input, &output).unwrap_err();
    assert!(matches!(err, PipelineError::WorkerFailure { .. }), "{:?}", err);
    assert_eq!(err.stage(), "scan");
    assert_eq!(fs::read_to_string(&output).unwrap(), "OLD");
}

#[cfg(unix)]
#[test]
fn worker_process_without_artifact_fails_collect() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let output = dir.path().join("out.json");
    let err = with_worker_program("/bin/true").run(&input, &output).unwrap_err();
    assert!(matches!(err, PipelineError::ArtifactMissing { .. }), "{:?}", err);
    assert_eq!(err.stage(), "collect");
    assert!(!output.exists());
}

#[test]
fn missing_input_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");
    let err = run(dir.path().join("nope.csv"), &output, 2).unwrap_err();
    assert!(matches!(err, PipelineError::InputNotFound { .. }));
    assert_eq!(err.stage(), "input");
    assert!(!output.exists());
}

#[test]
fn zero_workers_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    let err = run(&input, dir.path().join("out.json"), 0).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn unwritable_output_reports_output_stage() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir, "visits.csv", SCENARIO);
    // a directory where the output file should go
    let output = dir.path().join("taken");
    fs::create_dir(&output).unwrap();
    fs::write(output.join("keep"), b"x").unwrap();
    let cfg = PipelineConfig::default().with_store(StoreKind::Memory);
    let err = Pipeline::new(cfg).run(&input, &output).unwrap_err();
    assert_eq!(err.stage(), "output");
    assert!(output.is_dir());
}
