//! Batch processing of a directory of trial recordings.
//!
//! Data errors skip the trial and are recorded in the report. Configuration
//! errors stop the whole run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use crossbeam::channel;
use serde::{Deserialize, Serialize};

use crate::agreement::AgreementStats;
use crate::config::{GateConfig, RunConfig};
use crate::diagnostics::TrialDiagnostics;
use crate::error::{GateError, GateResult};
use crate::estimators::estimate_all;
use crate::loader::{matches_extension, TrialLoader};
use crate::types::{Method, Trajectory, TrialResult};
use crate::windowing::window_for;

/// A trial that produced no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialFailure {
    pub filename: String,
    /// Short error label, see [`GateError::kind`]
    pub kind: String,
    pub error: String,
}

impl TrialFailure {
    fn new(filename: &str, err: &GateError) -> Self {
        Self {
            filename: filename.to_string(),
            kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}

/// Summary of one batch invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// RFC 3339, UTC
    pub started_at: String,
    pub input_dir: PathBuf,
    pub gates: GateConfig,
    /// Successful trials in filename order
    pub trials: Vec<TrialResult>,
    pub failures: Vec<TrialFailure>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.trials.len() + self.failures.len()
    }

    /// Trials whose estimate passed for `method`
    pub fn valid_count(&self, method: Method) -> usize {
        self.trials
            .iter()
            .filter(|t| t.estimate(method).is_valid)
            .count()
    }

    /// Velocity vs distance/time agreement, once there are at least two trials
    pub fn method_agreement(&self) -> Option<AgreementStats> {
        if self.trials.len() < 2 {
            return None;
        }
        AgreementStats::between_methods(&self.trials).ok()
    }
}

/// Result of one successful trial
#[derive(Debug, Clone)]
pub struct TrialOutput {
    pub result: TrialResult,
    pub diagnostics: Option<TrialDiagnostics>,
}

/// Everything a batch run produced
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub diagnostics: Vec<TrialDiagnostics>,
}

/// Window and estimate an already-loaded trajectory with both methods.
///
/// Fails if either method fails.
pub fn process_trajectory(
    filename: &str,
    trajectory: &Trajectory,
    config: &GateConfig,
    with_diagnostics: bool,
) -> GateResult<TrialOutput> {
    let windowed = window_for(trajectory, config)?;
    let estimates = estimate_all(&windowed, config)?;

    let diagnostics = if with_diagnostics {
        Some(TrialDiagnostics::build(filename, &windowed, config)?)
    } else {
        None
    };

    Ok(TrialOutput {
        result: TrialResult {
            filename: filename.to_string(),
            estimates,
            bounds: config.speed_bounds(),
        },
        diagnostics,
    })
}

/// Trial files in `dir` with `extension` (or `extension.gz`), sorted by name
pub fn list_trials(dir: &Path, extension: &str) -> GateResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        GateError::invalid_config(format!("cannot read input directory {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && matches_extension(&path, extension) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct BatchRunner {
    config: RunConfig,
    loader: TrialLoader,
}

impl BatchRunner {
    /// Validates the configuration once for the whole run
    pub fn new(config: RunConfig) -> GateResult<Self> {
        config.validate()?;
        if !config.gates.gates_ordered() {
            log::warn!(
                "gate1_pos ({}) is not above gate2_pos ({}); interior windows will be empty",
                config.gates.gate1_pos,
                config.gates.gate2_pos
            );
        }

        let loader = TrialLoader::new(
            config.batch.markers.clone(),
            config.batch.unit_scale,
            config.gates.sampling_rate,
        );
        Ok(Self { config, loader })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load and estimate a single trial file
    pub fn process_file(&self, path: &Path) -> GateResult<TrialOutput> {
        let trial = self.loader.load(path)?;
        log::debug!(
            "{}: {} frames ({:.2} s)",
            path.display(),
            trial.trajectory.len(),
            trial.trajectory.duration()
        );
        process_trajectory(
            &display_name(path),
            &trial.trajectory,
            &self.config.gates,
            self.config.batch.write_diagnostics,
        )
    }

    /// Process every trial in the configured input directory
    pub fn run(&self) -> GateResult<BatchOutcome> {
        let paths = list_trials(&self.config.batch.input_dir, &self.config.batch.extension)?;
        if paths.is_empty() {
            log::warn!(
                "no .{} files in {}",
                self.config.batch.extension,
                self.config.batch.input_dir.display()
            );
        }
        self.run_paths(&paths)
    }

    /// Process `paths` and report in the given order
    pub fn run_paths(&self, paths: &[PathBuf]) -> GateResult<BatchOutcome> {
        let started_at = Utc::now().to_rfc3339();
        let jobs = self.config.batch.jobs.min(paths.len()).max(1);

        let outcomes = if jobs > 1 {
            self.run_parallel(paths, jobs)?
        } else {
            paths.iter().map(|p| self.process_file(p)).collect()
        };

        let mut trials = Vec::new();
        let mut failures = Vec::new();
        let mut diagnostics = Vec::new();

        for (path, outcome) in paths.iter().zip(outcomes) {
            let name = display_name(path);
            match outcome {
                Ok(output) => {
                    log_success(&output.result);
                    trials.push(output.result);
                    diagnostics.extend(output.diagnostics);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Skipping {}: {}", name, e);
                    failures.push(TrialFailure::new(&name, &e));
                }
            }
        }

        log::info!(
            "processed {} trials: {} ok, {} skipped",
            paths.len(),
            trials.len(),
            failures.len()
        );

        Ok(BatchOutcome {
            report: BatchReport {
                started_at,
                input_dir: self.config.batch.input_dir.clone(),
                gates: self.config.gates.clone(),
                trials,
                failures,
            },
            diagnostics,
        })
    }

    /// Fan trials out to `jobs` scoped workers; results come back by input index
    fn run_parallel(&self, paths: &[PathBuf], jobs: usize) -> GateResult<Vec<GateResult<TrialOutput>>> {
        let (job_tx, job_rx) = channel::unbounded::<(usize, &Path)>();
        let (result_tx, result_rx) = channel::unbounded();

        for (i, path) in paths.iter().enumerate() {
            // receiver is alive for the whole function
            let _ = job_tx.send((i, path.as_path()));
        }
        drop(job_tx);

        crossbeam::scope(|s| {
            for _ in 0..jobs {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move |_| {
                    for (i, path) in job_rx.iter() {
                        if result_tx.send((i, self.process_file(path))).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .map_err(|_| GateError::Io(io::Error::new(io::ErrorKind::Other, "trial worker panicked")))?;
        drop(result_tx);

        let mut slots: Vec<Option<GateResult<TrialOutput>>> = paths.iter().map(|_| None).collect();
        for (i, outcome) in result_rx.iter() {
            slots[i] = Some(outcome);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    GateError::Io(io::Error::new(io::ErrorKind::Other, "trial result missing"))
                })
            })
            .collect()
    }
}

fn log_success(result: &TrialResult) {
    let describe = |method: Method| {
        let e = result.estimate(method);
        format!("{:.3} m/s ({})", e.speed_mps, if e.is_valid { "valid" } else { "invalid" })
    };
    log::info!(
        "{}: velocity {}, distance/time {}",
        result.filename,
        describe(Method::Velocity),
        describe(Method::DistanceTime)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WindowStage;
    use approx::assert_relative_eq;
    use std::fs::File;
    use tempfile::TempDir;

    fn run(config: &GateConfig, speed: f64, samples: usize) -> Trajectory {
        let step = speed / config.sampling_rate;
        let start = config.gate2_pos - config.margin;
        let points: Vec<[f64; 3]> = (0..samples).map(|i| [0.2, start + i as f64 * step, 1.0]).collect();
        Trajectory::from_xyz(&points, config.sampling_rate)
    }

    #[test]
    fn test_process_trajectory() {
        let config = GateConfig::default();
        let traj = run(&config, 3.5, 800);
        let output = process_trajectory("t.tsv", &traj, &config, true).unwrap();

        assert_eq!(output.result.filename, "t.tsv");
        assert_relative_eq!(
            output.result.estimate(Method::Velocity).speed_mps,
            3.5,
            max_relative = 1e-9
        );
        assert_eq!(output.result.bounds, config.speed_bounds());
        assert!(output.diagnostics.is_some());
    }

    #[test]
    fn test_process_trajectory_fails_when_either_method_fails() {
        let config = GateConfig::default();
        // one interior sample: velocity works, distance/time does not
        let traj = Trajectory::from_xyz(&[[0.0, -0.8, 1.0], [0.0, 0.5, 1.0], [0.0, 2.0, 1.0]], 200.0);
        let err = process_trajectory("t.tsv", &traj, &config, false).unwrap_err();
        assert!(matches!(err, GateError::DivisionByZero { .. }));

        let outside = Trajectory::from_xyz(&[[0.0, 9.0, 1.0]], 200.0);
        let err = process_trajectory("t.tsv", &outside, &config, false).unwrap_err();
        assert!(matches!(
            err,
            GateError::EmptyWindow {
                stage: WindowStage::Coarse
            }
        ));
    }

    #[test]
    fn test_list_trials_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.tsv", "a.tsv", "c.tsv.gz", "notes.txt", "d.csv"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("sub.tsv")).unwrap();

        let names: Vec<String> = list_trials(dir.path(), "tsv")
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(names, vec!["a.tsv", "b.tsv", "c.tsv.gz"]);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let err = list_trials(Path::new("/nonexistent/trials"), "tsv").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_runner_rejects_invalid_config() {
        let mut config = RunConfig::default();
        config.gates.sampling_rate = -1.0;
        assert!(BatchRunner::new(config).is_err());
    }

    #[test]
    fn test_report_counts() {
        let config = GateConfig::default();
        let ok = process_trajectory("a.tsv", &run(&config, 3.5, 800), &config, false).unwrap();
        let slow = process_trajectory("b.tsv", &run(&config, 2.0, 1400), &config, false).unwrap();
        let report = BatchReport {
            started_at: Utc::now().to_rfc3339(),
            input_dir: PathBuf::from("."),
            gates: config.clone(),
            trials: vec![ok.result, slow.result],
            failures: vec![TrialFailure::new(
                "c.tsv",
                &GateError::EmptyWindow {
                    stage: WindowStage::Interior,
                },
            )],
        };

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.valid_count(Method::Velocity), 1);
        assert_eq!(report.failures[0].kind, "empty_window");
        assert_eq!(report.method_agreement().unwrap().n, 2);
    }
}
