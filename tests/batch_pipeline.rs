use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use approx::assert_relative_eq;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use timing_gates_rs::report::{self, AGREEMENT_JSON, CSV_HEADER, RESULTS_CSV, RESULTS_JSON};
use timing_gates_rs::{BatchReport, BatchRunner, GateError, Method, RunConfig};

const FS: f64 = 200.0;

/// Qualisys-style export of a constant-speed run along +y, in millimeters
fn qualisys_tsv(left: &str, right: &str, speed: f64, start_y: f64, end_y: f64) -> String {
    let step = speed / FS;
    let frames = ((end_y - start_y) / step) as usize + 1;

    let mut out = String::new();
    out.push_str(&format!("NO_OF_FRAMES\t{}\n", frames));
    out.push_str("NO_OF_CAMERAS\t12\n");
    out.push_str("NO_OF_MARKERS\t2\n");
    out.push_str(&format!("FREQUENCY\t{}\n", FS));
    out.push_str("NO_OF_ANALOG\t0\n");
    out.push_str("ANALOG_FREQUENCY\t0\n");
    out.push_str("DESCRIPTION\t--\n");
    out.push_str("TIME_STAMP\t2024-03-01, 10:47:36.627\t94247.45\n");
    out.push_str("DATA_INCLUDED\t3D\n");
    out.push_str(&format!("MARKER_NAMES\t{}\t{}\n", left, right));
    out.push_str("TRAJECTORY_TYPES\tMeasured\tMeasured\n");
    out.push_str(&format!(
        "Frame\tTime\t{l} X\t{l} Y\t{l} Z\t{r} X\t{r} Y\t{r} Z\n",
        l = left,
        r = right
    ));
    for i in 0..frames {
        let y = (start_y + i as f64 * step) * 1000.0;
        out.push_str(&format!(
            "{}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}\n",
            i + 1,
            i as f64 / FS,
            -150.0,
            y + 4.0,
            950.0,
            150.0,
            y - 4.0,
            952.0
        ));
    }
    out
}

fn run_tsv(speed: f64) -> String {
    qualisys_tsv("SIPS_left", "SIPS_right", speed, -1.2, 2.5)
}

fn write_gz(path: &Path, text: &str) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

/// Four trials: on target, too slow (gzip), never reaching the gates, wrong markers
fn trial_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("run_01.tsv"), run_tsv(3.5)).unwrap();
    write_gz(&dir.path().join("run_02.tsv.gz"), &run_tsv(3.0));
    fs::write(
        dir.path().join("run_03.tsv"),
        qualisys_tsv("SIPS_left", "SIPS_right", 0.5, 5.0, 5.5),
    )
    .unwrap();
    fs::write(
        dir.path().join("run_04.tsv"),
        qualisys_tsv("LASI", "RASI", 3.5, -1.2, 2.5),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a trial").unwrap();
    dir
}

fn config_for(dir: &Path, jobs: usize) -> RunConfig {
    let mut config = RunConfig::default();
    config.batch.input_dir = dir.to_path_buf();
    config.batch.output_dir = dir.join("processed_data");
    config.batch.jobs = jobs;
    config
}

fn run(dir: &Path, jobs: usize) -> BatchReport {
    BatchRunner::new(config_for(dir, jobs))
        .unwrap()
        .run()
        .unwrap()
        .report
}

#[test]
fn test_batch_skips_bad_trials_and_continues() {
    let dir = trial_dir();
    let report = run(dir.path(), 1);

    let names: Vec<&str> = report.trials.iter().map(|t| t.filename.as_str()).collect();
    assert_eq!(names, vec!["run_01.tsv", "run_02.tsv.gz"]);

    let on_target = &report.trials[0];
    let velocity = on_target.estimate(Method::Velocity);
    assert_relative_eq!(velocity.speed_mps, 3.5, max_relative = 1e-3);
    assert!(velocity.is_valid);
    let chord = on_target.estimate(Method::DistanceTime);
    assert_relative_eq!(chord.speed_mps, 3.5, max_relative = 0.02);
    assert!(chord.is_valid);

    let slow = &report.trials[1];
    assert_relative_eq!(
        slow.estimate(Method::Velocity).speed_mps,
        3.0,
        max_relative = 1e-3
    );
    assert!(!slow.estimate(Method::Velocity).is_valid);
    assert!(!slow.estimate(Method::DistanceTime).is_valid);

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].filename, "run_03.tsv");
    assert_eq!(report.failures[0].kind, "empty_window");
    assert_eq!(report.failures[1].filename, "run_04.tsv");
    assert_eq!(report.failures[1].kind, "load");
    assert!(report.failures[1].error.contains("SIPS_left X"));

    assert_eq!(report.attempted(), 4);
    assert_eq!(report.valid_count(Method::Velocity), 1);
}

#[test]
fn test_parallel_run_matches_sequential() {
    let dir = trial_dir();
    let sequential = run(dir.path(), 1);
    let parallel = run(dir.path(), 3);

    assert_eq!(parallel.trials, sequential.trials);
    assert_eq!(parallel.failures, sequential.failures);
}

#[test]
fn test_outputs_written() {
    let dir = trial_dir();
    let mut config = config_for(dir.path(), 2);
    config.batch.write_diagnostics = true;
    let output_dir = config.batch.output_dir.clone();

    let outcome = BatchRunner::new(config).unwrap().run().unwrap();
    assert_eq!(outcome.diagnostics.len(), 2);
    report::write_outputs(&outcome, &output_dir).unwrap();

    let csv = fs::read_to_string(output_dir.join(RESULTS_CSV)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("run_01.tsv,"));
    assert!(lines[1].ends_with(",3.150000,3.850000"));

    let json = fs::read_to_string(output_dir.join(RESULTS_JSON)).unwrap();
    let saved: BatchReport = serde_json::from_str(&json).unwrap();
    assert_eq!(saved.trials, outcome.report.trials);
    assert_eq!(saved.failures.len(), 2);

    assert!(output_dir.join(AGREEMENT_JSON).exists());
    assert!(output_dir.join("run_01_diagnostics.json").exists());
    assert!(output_dir.join("run_02_diagnostics.json").exists());
}

#[test]
fn test_invalid_axis_in_config_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.json");
    fs::write(&path, r#"{ "gates": { "axis": "z" } }"#).unwrap();

    let err = RunConfig::load(&path).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_missing_input_dir_aborts() {
    let dir = TempDir::new().unwrap();
    let runner = BatchRunner::new(config_for(&dir.path().join("missing"), 1)).unwrap();
    let err = runner.run().unwrap_err();
    assert!(matches!(err, GateError::InvalidConfig(_)));
}

#[test]
fn test_empty_directory_gives_empty_report() {
    let dir = TempDir::new().unwrap();
    let outcome = BatchRunner::new(config_for(dir.path(), 4)).unwrap().run().unwrap();
    assert!(outcome.report.trials.is_empty());
    assert!(outcome.report.failures.is_empty());
    assert!(outcome.report.method_agreement().is_none());
}
