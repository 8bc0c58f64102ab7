//! Command-line entry point: reads a JSON run configuration, values the claims table,
//! and prints the JSON report (optionally followed by a plain-text summary).

use std::error::Error;
use std::path::PathBuf;

use capval::config::RunConfig;
use capval::core::to_json_pretty;
use capval::valuation::run_valuation;
use clap::Parser;
use tracing_subscriber::EnvFilter;

type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Debug, Parser)]
#[command(name = "capval")]
#[command(about = "Value and calibrate private-company equity claims from a cap table")]
struct Args {
    /// JSON run configuration; `-` reads standard input.
    config: PathBuf,

    /// Override the configured number of draws.
    #[arg(long)]
    sample_size: Option<usize>,

    /// Override the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Print a plain-text summary after the JSON report.
    #[arg(long)]
    summary: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log: String,
}

fn read_config(path: &PathBuf) -> AppResult<String> {
    if path.as_os_str() == "-" {
        Ok(std::io::read_to_string(std::io::stdin())?)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn run(args: Args) -> AppResult<bool> {
    let mut config = RunConfig::from_json(&read_config(&args.config)?)?;
    if args.sample_size.is_some() {
        config.sample_size = args.sample_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    let table = config.claims_table()?;
    let inputs = config.to_inputs();
    tracing::info!(
        config = %args.config.display(),
        classes = table.len(),
        mode = ?config.input_mode,
        sample_size = inputs.sample_size,
        "running valuation"
    );

    let report = run_valuation(&table, &inputs);
    println!("{}", to_json_pretty(&report)?);
    if args.summary {
        println!();
        print!("{}", report.summary());
    }
    Ok(report.status)
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("capval failed: {err}");
            std::process::exit(1);
        }
    }
}
