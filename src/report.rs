//! Result files written after a batch run.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::{BatchOutcome, BatchReport};
use crate::diagnostics::TrialDiagnostics;
use crate::error::GateResult;
use crate::types::Method;

pub const RESULTS_CSV: &str = "speed_results.csv";
pub const RESULTS_JSON: &str = "speed_results.json";
pub const AGREEMENT_JSON: &str = "agreement.json";

pub const CSV_HEADER: &str = "filename,velocity_speed_mps,velocity_valid,distance_speed_mps,distance_valid,lower_bound,upper_bound";

/// Quote a CSV field when it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per successful trial, header first
pub fn results_csv(report: &BatchReport) -> String {
    let mut csv = String::with_capacity(64 * (report.trials.len() + 1));
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for trial in &report.trials {
        let v = trial.estimate(Method::Velocity);
        let d = trial.estimate(Method::DistanceTime);
        let _ = writeln!(
            csv,
            "{},{:.6},{},{:.6},{},{:.6},{:.6}",
            csv_field(&trial.filename),
            v.speed_mps,
            v.is_valid,
            d.speed_mps,
            d.is_valid,
            trial.bounds.lower,
            trial.bounds.upper
        );
    }
    csv
}

/// `Running_FIX 1.tsv.gz` -> `Running_FIX 1`
pub fn trial_stem(filename: &str) -> &str {
    let name = filename.strip_suffix(".gz").unwrap_or(filename);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

pub fn diagnostics_filename(diagnostics: &TrialDiagnostics) -> String {
    format!("{}_diagnostics.json", trial_stem(&diagnostics.filename))
}

/// Write every result file into `output_dir`; returns the paths written
pub fn write_outputs(outcome: &BatchOutcome, output_dir: &Path) -> GateResult<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;
    let mut written = Vec::new();

    let path = output_dir.join(RESULTS_CSV);
    fs::write(&path, results_csv(&outcome.report))?;
    written.push(path);

    let path = output_dir.join(RESULTS_JSON);
    fs::write(&path, serde_json::to_string_pretty(&outcome.report)?)?;
    written.push(path);

    if let Some(stats) = outcome.report.method_agreement() {
        let path = output_dir.join(AGREEMENT_JSON);
        fs::write(&path, serde_json::to_string_pretty(&stats)?)?;
        written.push(path);
    }

    for diag in &outcome.diagnostics {
        let path = output_dir.join(diagnostics_filename(diag));
        fs::write(&path, serde_json::to_string_pretty(diag)?)?;
        written.push(path);
    }

    log::debug!("wrote {} files to {}", written.len(), output_dir.display());
    Ok(written)
}
