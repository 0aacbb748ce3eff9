//! trueno-sweep - run, resume and collect parameter-sweep campaigns
//!
//! Every subcommand reads one campaign config (`.yaml`, `.yml` or `.json`).
//! `run` is restartable: killing it and running it again resumes from the
//! last completed chunk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trueno_sweep::campaign::Campaign;
use trueno_sweep::config::{CampaignConfig, ConfigOverrides};
use trueno_sweep::provenance::RunSummary;

#[derive(Parser, Debug)]
#[command(name = "trueno-sweep")]
#[command(version, about = "Restartable parameter-sweep campaigns with Parquet checkpoints")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every pending chunk, then build the feature table
    Run(CampaignArgs),
    /// Build the feature table from artifacts already on disk
    Collect(CampaignArgs),
    /// Write design.parquet only
    Design(CampaignArgs),
}

#[derive(Args, Debug)]
struct CampaignArgs {
    /// Campaign config file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the output directory
    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Override samples per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Override concurrent workers
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Override the near-optimality threshold
    #[arg(long = "fraction")]
    fraction_of_optimum: Option<f64>,
}

impl CampaignArgs {
    fn campaign(&self) -> Result<Campaign> {
        let mut config = CampaignConfig::load(&self.config)
            .with_context(|| format!("loading config {}", self.config.display()))?;
        config
            .apply(&ConfigOverrides {
                outdir: self.outdir.clone(),
                chunk_size: self.chunk_size,
                parallelism: self.parallelism,
                fraction_of_optimum: self.fraction_of_optimum,
            })
            .context("applying command-line overrides")?;
        Campaign::new(config).context("resolving design and targets")
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "trueno_sweep=debug"
    } else {
        "trueno_sweep=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn report(summary: &RunSummary) {
    tracing::info!(
        mode = ?summary.mode(),
        feature_rows = summary.feature_rows(),
        samples_with_results = summary.samples_with_results(),
        failed_samples = summary.failed_samples(),
        "done"
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let summary = match &cli.command {
        Command::Run(args) => {
            let campaign = args.campaign()?;
            let simulator = campaign.config().command_simulator()?;
            tracing::info!(
                outdir = %campaign.paths().root().display(),
                program = simulator.program(),
                "starting campaign"
            );
            campaign.run(simulator).context("campaign run failed")?
        }
        Command::Collect(args) => args.campaign()?.collect().context("collect failed")?,
        Command::Design(args) => args
            .campaign()?
            .design_only()
            .context("writing design failed")?,
    };

    report(&summary);
    Ok(())
}
