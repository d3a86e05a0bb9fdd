use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use timing_gates_rs::report::write_outputs;
use timing_gates_rs::{Axis, BatchReport, BatchRunner, Method, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "timing_gates")]
#[command(about = "Running speed from marker trajectories through virtual timing gates", long_about = None)]
struct Args {
    /// Directory of Qualisys TSV exports (.tsv or .tsv.gz)
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Where speed_results.csv/json are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gate 1 position on the running axis (m)
    #[arg(long, allow_hyphen_values = true)]
    gate1: Option<f64>,

    /// Gate 2 position on the running axis (m)
    #[arg(long, allow_hyphen_values = true)]
    gate2: Option<f64>,

    /// Target speed (m/s)
    #[arg(long)]
    target_speed: Option<f64>,

    /// Accepted deviation from the target speed (%)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Marker sampling rate (Hz)
    #[arg(long)]
    fs: Option<f64>,

    /// Running axis (x or y)
    #[arg(long)]
    axis: Option<String>,

    /// Capture margin around the gates (m)
    #[arg(long)]
    margin: Option<f64>,

    /// Left marker name, e.g. SIPS_left
    #[arg(long)]
    left_marker: Option<String>,

    /// Right marker name, e.g. SIPS_right
    #[arg(long)]
    right_marker: Option<String>,

    /// Worker threads
    #[arg(long)]
    jobs: Option<usize>,

    /// Write <trial>_diagnostics.json plot data per trial
    #[arg(long)]
    diagnostics: bool,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        let gates = &mut config.gates;
        if let Some(v) = self.gate1 {
            gates.gate1_pos = v;
        }
        if let Some(v) = self.gate2 {
            gates.gate2_pos = v;
        }
        if let Some(v) = self.target_speed {
            gates.target_speed = v;
        }
        if let Some(v) = self.tolerance {
            gates.tolerance_pct = v;
        }
        if let Some(v) = self.fs {
            gates.sampling_rate = v;
        }
        if let Some(axis) = &self.axis {
            gates.axis = axis.parse::<Axis>()?;
        }
        if let Some(v) = self.margin {
            gates.margin = v;
        }

        let batch = &mut config.batch;
        if let Some(dir) = &self.input_dir {
            batch.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            batch.output_dir = dir.clone();
        }
        if let Some(name) = &self.left_marker {
            batch.markers.left = name.clone();
        }
        if let Some(name) = &self.right_marker {
            batch.markers.right = name.clone();
        }
        if let Some(jobs) = self.jobs {
            batch.jobs = jobs;
        }
        if self.diagnostics {
            batch.write_diagnostics = true;
        }

        Ok(config)
    }
}

fn print_summary(report: &BatchReport) {
    let bounds = report.gates.speed_bounds();
    println!();
    println!(
        "{:<32} {:>10} {:>6} {:>10} {:>6}",
        "trial", "velocity", "ok", "dist/time", "ok"
    );
    for trial in &report.trials {
        let cell = |method: Method| {
            let e = trial.estimate(method);
            (format!("{:.3}", e.speed_mps), if e.is_valid { "yes" } else { "no" })
        };
        let (v, v_ok) = cell(Method::Velocity);
        let (d, d_ok) = cell(Method::DistanceTime);
        println!("{:<32} {:>10} {:>6} {:>10} {:>6}", trial.filename, v, v_ok, d, d_ok);
    }
    for failure in &report.failures {
        println!("{:<32} skipped: {}", failure.filename, failure.error);
    }
    println!();
    println!(
        "  Bounds: [{:.3}, {:.3}] m/s (target {:.2} m/s +/- {}%)",
        bounds.lower, bounds.upper, report.gates.target_speed, report.gates.tolerance_pct
    );
    println!(
        "  Valid: velocity {}/{}, distance/time {}/{}",
        report.valid_count(Method::Velocity),
        report.trials.len(),
        report.valid_count(Method::DistanceTime),
        report.trials.len()
    );
    if let Some(stats) = report.method_agreement() {
        println!(
            "  Agreement (velocity - distance/time): bias {:.4} m/s, LoA [{:.4}, {:.4}]",
            stats.bias, stats.lower_loa, stats.upper_loa
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.run_config()?;

    println!("Timing Gates Speed Analysis");
    println!("  Input Dir: {}", config.batch.input_dir.display());
    println!("  Output Dir: {}", config.batch.output_dir.display());
    println!(
        "  Gates: {} / {} m on {} (margin {} m)",
        config.gates.gate1_pos, config.gates.gate2_pos, config.gates.axis, config.gates.margin
    );
    println!("  Sampling Rate: {} Hz", config.gates.sampling_rate);

    let output_dir = config.batch.output_dir.clone();
    let runner = BatchRunner::new(config)?;
    let outcome = runner.run()?;

    let written = write_outputs(&outcome, &output_dir)
        .with_context(|| format!("writing results to {}", output_dir.display()))?;

    print_summary(&outcome.report);
    for path in &written {
        println!("  Saved {}", path.display());
    }

    Ok(())
}
