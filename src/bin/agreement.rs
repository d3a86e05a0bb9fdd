use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

use timing_gates_rs::agreement::{compare_columns, SpeedTable};

/// Bland-Altman agreement of one or more speed columns against a reference column
#[derive(Parser, Debug)]
#[command(name = "agreement")]
struct Args {
    /// CSV file with a header row
    #[arg(long)]
    csv: PathBuf,

    /// Reference column, e.g. IR timing gate speed
    #[arg(long)]
    reference: String,

    /// Column to compare against the reference (repeatable)
    #[arg(long = "method", required = true)]
    methods: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let table = SpeedTable::load(&args.csv)?;
    log::info!("{}: {} rows, columns {:?}", args.csv.display(), table.len(), table.columns);

    let stats = compare_columns(&table, &args.reference, &args.methods)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
