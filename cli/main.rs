#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use inputpairs::config::CategorizeConfig;
use inputpairs::data::ChangeDataset;
use inputpairs::pipeline::Categorizer;
use inputpairs::progress::ConsolePairProgress;
use inputpairs::results::{categorization_file_name, coefficient_file_name};
use inputpairs::types::YearRange;

type CliResult = Result<(), Box<dyn Error + Send + Sync>>;

#[derive(Parser)]
#[command(
    name = "inputpairs",
    version,
    about = "Classify industry input pairs as substitutes or complements"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, perturb and classify every industry against the focus commodity
    Run(RunArgs),
    /// Write the default configuration to a TOML file
    DefaultConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Replace the file if it already exists
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Long-format input change ratios: year,industry,commodity,value
    #[arg(long, default_value = "processed_data/input_quantity_changes.csv")]
    input_changes: PathBuf,

    /// Long-format output change ratios: year,industry,quantity_change
    #[arg(long, default_value = "processed_data/output_quantity_changes.csv")]
    output_changes: PathBuf,

    /// TOML configuration; defaults are used for anything it leaves out
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Directory receiving the coefficient and categorization tables
    #[arg(long, default_value = "results_data")]
    out_dir: PathBuf,

    /// Focus commodity code
    #[arg(long)]
    focus: Option<String>,

    /// Year range START:END; repeat the flag for several ranges
    #[arg(long = "years", value_name = "START:END")]
    years: Vec<YearRange>,

    /// Divisor applied to the model RMSE to form the classification threshold
    #[arg(long)]
    rmse_divisor: Option<f64>,

    /// Worker threads for the cross-validated search (0 = all cores)
    #[arg(long)]
    jobs: Option<usize>,

    /// Seed for fold assignment and subsampling
    #[arg(long, conflicts_with = "unseeded")]
    seed: Option<u64>,

    /// Draw a fresh seed for this run
    #[arg(long)]
    unseeded: bool,

    /// Replace result tables that already exist
    #[arg(long)]
    overwrite: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::DefaultConfig { path, overwrite }) => write_default_config(&path, overwrite),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: RunArgs) -> CliResult {
    let start = Instant::now();

    let mut config = match &args.config {
        Some(path) => CategorizeConfig::load(path)?,
        None => CategorizeConfig::default(),
    };
    if let Some(focus) = args.focus {
        config.focus_commodity = focus;
    }
    if !args.years.is_empty() {
        config.year_ranges = args.years;
    }
    if let Some(divisor) = args.rmse_divisor {
        config.rmse_divisor = divisor;
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(seed) = args.seed {
        config.cv.seed = Some(seed);
    }
    if args.unseeded {
        config.cv.seed = None;
    }
    config.validate()?;

    let coefficient_path = args.out_dir.join(coefficient_file_name(&config.focus_commodity));
    let categorization_path = args
        .out_dir
        .join(categorization_file_name(&config.focus_commodity));
    if !args.overwrite {
        for path in [&coefficient_path, &categorization_path] {
            if path.exists() {
                return Err(format!(
                    "Output file '{}' already exists. Pass --overwrite to replace it.",
                    path.display()
                )
                .into());
            }
        }
    }

    let dataset = ChangeDataset::load(
        &args.input_changes,
        &args.output_changes,
        &config.dropped_commodities,
    )?;
    let categorizer = Categorizer::from_config(&config)?;
    let output = categorizer.run(&dataset, &mut ConsolePairProgress::new())?;

    fs::create_dir_all(&args.out_dir)?;
    output.coefficients.write_csv(&coefficient_path)?;
    output.categorizations.write_csv(&categorization_path)?;

    log::info!(
        "Wrote {} and {} in {:.1?}.",
        coefficient_path.display(),
        categorization_path.display(),
        start.elapsed()
    );
    Ok(())
}

fn write_default_config(path: &Path, overwrite: bool) -> CliResult {
    if path.exists() && !overwrite {
        return Err(format!(
            "'{}' already exists. Pass --overwrite to replace it.",
            path.display()
        )
        .into());
    }
    CategorizeConfig::default().save(path)?;
    log::info!("Default configuration written to {}.", path.display());
    Ok(())
}
