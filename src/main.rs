use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod aggregate;
mod artifacts;
mod config;
mod error;
mod estimator;
mod logging;
mod models;
mod panel;
mod pipeline;
mod plot;
mod report;
mod svg;

use config::PipelineConfig;

#[derive(Parser)]
#[command(name = "paidsearch-did")]
#[command(about = "Difference-in-differences estimate of the revenue effect of paid search", long_about = None)]
struct Cli {
    /// TOML file overriding the default paths and intervention date
    #[arg(long, global = true, env = "DID_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct PathOverrides {
    /// Directory holding the treated/untreated pivot tables
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Directory receiving tables/ and figures/
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the raw panel into per-DMA pivot tables and draw the trend figures
    Preprocess {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        paths: PathOverrides,
    },
    /// Estimate the effect from the pivot tables and write the LaTeX table
    Estimate {
        #[arg(long)]
        json: Option<PathBuf>,
        #[command(flatten)]
        paths: PathOverrides,
    },
    /// Preprocess, then estimate
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
        #[command(flatten)]
        paths: PathOverrides,
    },
}

fn resolve_config(
    file: Option<&std::path::Path>,
    input: Option<PathBuf>,
    paths: PathOverrides,
) -> anyhow::Result<PipelineConfig> {
    Ok(PipelineConfig::load(file)?
        .with_input(input)
        .with_temp_dir(paths.temp_dir)
        .with_output_dir(paths.output_dir))
}

fn preprocess(config: &PipelineConfig) -> anyhow::Result<()> {
    let overview = pipeline::run_preprocess(config).context("preprocessing failed")?;
    print!("{}", report::overview_summary(&overview));
    Ok(())
}

fn estimate(config: &PipelineConfig, json: Option<&std::path::Path>) -> anyhow::Result<()> {
    let estimate = pipeline::run_estimate(config, json).context("estimation failed")?;
    print!("{}", report::estimate_summary(&estimate));
    println!("Table written to {}.", config.latex_table.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    match cli.command {
        Commands::Preprocess { input, paths } => {
            let config = resolve_config(cli.config.as_deref(), input, paths)?;
            preprocess(&config)?;
        }
        Commands::Estimate { json, paths } => {
            let config = resolve_config(cli.config.as_deref(), None, paths)?;
            estimate(&config, json.as_deref())?;
        }
        Commands::Run {
            input,
            json,
            paths,
        } => {
            let config = resolve_config(cli.config.as_deref(), input, paths)?;
            preprocess(&config)?;
            println!();
            estimate(&config, json.as_deref())?;
        }
    }

    Ok(())
}
