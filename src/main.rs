mod config;
mod data;
mod error;
mod evaluation;
mod features;
mod ml;
mod pipeline;
mod store;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{default_config_toml, load_config, PipelineConfig};
use evaluation::{ClassificationReport, RegressionReport};
use ml::Task;
use pipeline::{find_pipeline, names, plan, registry, run_pipeline, DEFAULT_PIPELINE};
use store::{ArtifactStore, MemoryStore, SledStore, StoreExt};

#[derive(Parser)]
#[command(name = "league-pipeline")]
#[command(version)]
#[command(about = "Feature engineering, model training and evaluation for League of Legends matches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "pipeline.toml", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Artifact store directory (overrides store.path)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Keep artifacts in memory only; nothing persists after the run
    #[arg(long, global = true)]
    memory_store: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named pipeline
    Run {
        /// Pipeline name or alias (see `list`)
        #[arg(short, long, default_value = DEFAULT_PIPELINE)]
        pipeline: String,
    },
    /// List registered pipelines and their stages
    List,
    /// Print the run plan of a pipeline as JSON for an external scheduler
    Plan {
        #[arg(short, long, default_value = DEFAULT_PIPELINE)]
        pipeline: String,
    },
    /// Write the default configuration as TOML
    InitConfig {
        #[arg(short, long, default_value = "pipeline.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List the artifacts held in the store
    Artifacts,
    /// Print a stored evaluation report
    ShowReport {
        /// regression or classification
        #[arg(short, long)]
        task: Task,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;
    info!("League pipeline v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { pipeline } => {
            let config = load_config(Path::new(&cli.config)).context("Failed to load configuration")?;
            let pipeline = find_pipeline(&pipeline)?;
            let mut store = open_store(&config, cli.store, cli.memory_store)?;

            let summary = run_pipeline(&pipeline, &config, store.as_mut())
                .with_context(|| format!("Pipeline '{}' failed", pipeline.name))?;
            for timing in &summary.stages {
                info!("  {:<36} {:>10.2?}", timing.stage.name(), timing.elapsed);
            }
            info!("Run {} of '{}' complete in {:.2?}", summary.run_id, summary.pipeline, summary.elapsed);
        }
        Commands::List => {
            for pipeline in registry() {
                if pipeline.aliases.is_empty() {
                    println!("{}", pipeline.name);
                } else {
                    println!("{} (aliases: {})", pipeline.name, pipeline.aliases.join(", "));
                }
                for stage in &pipeline.stages {
                    println!("  - {}", stage);
                }
            }
        }
        Commands::Plan { pipeline } => {
            let config = load_config(Path::new(&cli.config)).context("Failed to load configuration")?;
            let pipeline = find_pipeline(&pipeline)?;
            println!("{}", serde_json::to_string_pretty(&plan(&pipeline, &config.scheduler))?);
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            std::fs::write(&output, default_config_toml()?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Default configuration written to {}", output.display());
        }
        Commands::Artifacts => {
            let config = load_config(Path::new(&cli.config)).context("Failed to load configuration")?;
            let store = open_store(&config, cli.store, cli.memory_store)?;
            let stored = store.names()?;
            if stored.is_empty() {
                info!("Artifact store is empty");
            }
            for name in stored {
                println!("{}", name);
            }
        }
        Commands::ShowReport { task } => {
            let config = load_config(Path::new(&cli.config)).context("Failed to load configuration")?;
            let store = open_store(&config, cli.store, cli.memory_store)?;
            let json = match task {
                Task::Regression => {
                    let report: RegressionReport = store.load(names::REGRESSION_REPORT)?;
                    serde_json::to_string_pretty(&report)?
                }
                Task::Classification => {
                    let report: ClassificationReport = store.load(names::CLASSIFICATION_REPORT)?;
                    serde_json::to_string_pretty(&report)?
                }
            };
            println!("{}", json);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let result = if json { builder.json().try_init() } else { builder.try_init() };
    result.map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}

fn open_store(config: &PipelineConfig, path: Option<PathBuf>, memory: bool) -> Result<Box<dyn ArtifactStore>> {
    if memory {
        info!("Using in-memory artifact store");
        return Ok(Box::new(MemoryStore::new()));
    }
    let path = path.unwrap_or_else(|| config.store.path.clone());
    let store = SledStore::open(&path).with_context(|| format!("Failed to open artifact store at {}", path.display()))?;
    Ok(Box::new(store))
}
