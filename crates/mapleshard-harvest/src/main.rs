//! Mapleshard - harvest game data into CDN-friendly shards

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use mapleshard_common::logging::{init_logging, LogConfig, LogLevel};
use mapleshard_common::types::EntityKind;
use mapleshard_harvest::config::{HarvestConfig, IdSpace};
use mapleshard_harvest::pipeline::Harvester;
use mapleshard_harvest::repartition::{repartition, DatasetSource};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mapleshard")]
#[command(author, version, about = "Harvest game data into static JSON shards")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to harvest.toml (defaults to ./harvest.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the configured harvest jobs
    Run {
        /// Only run these entity families (repeatable)
        #[arg(short, long = "entity")]
        entities: Vec<EntityKind>,

        /// Output directory, overrides the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show a progress bar per job
        #[arg(long)]
        progress: bool,
    },

    /// Re-partition an already-normalized dataset
    #[command(group(ArgGroup::new("source").required(true).args(["dataset", "manifest"])))]
    Repartition {
        /// Entity family of the dataset
        #[arg(short, long)]
        entity: EntityKind,

        /// Checkpoint-shaped dataset file
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Existing manifest; its shards are read from the same directory
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Entities per shard (defaults to the family default)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Output directory, overrides the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the configured jobs and their effective settings
    Entities,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .filter_directives("hyper=warn,reqwest=warn")
        .include_location(cli.verbose)
        .log_file_prefix("mapleshard")
        .build()
        .with_env()?;

    let _guard = init_logging(&log_config)?;

    let config = HarvestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Run {
            entities,
            output,
            progress,
        } => run(&config, &entities, output, progress).await,
        Command::Repartition {
            entity,
            dataset,
            manifest,
            chunk_size,
            output,
        } => {
            let source = match (dataset, manifest) {
                (Some(path), _) => DatasetSource::Dataset(path),
                (None, Some(path)) => DatasetSource::Manifest(path),
                (None, None) => anyhow::bail!("Either --dataset or --manifest is required"),
            };
            let chunk_size = chunk_size
                .or_else(|| config.select_jobs(&[entity]).first().and_then(|job| job.chunk_size))
                .unwrap_or_else(|| mapleshard_harvest::family(entity).default_chunk_size());
            let output = output.unwrap_or_else(|| config.output.dir.clone());

            let manifest = repartition(entity, &source, chunk_size, &output)
                .with_context(|| format!("Failed to re-partition {}", entity))?;
            info!(
                entity = %entity,
                total_items = manifest.total_items,
                chunks = manifest.chunks.len(),
                output = %output.display(),
                "Re-partition complete"
            );
            Ok(())
        },
        Command::Entities => {
            for job in &config.jobs {
                let id_space = match job.id_space() {
                    IdSpace::Ranges(ranges) => ranges
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    IdSpace::Listing(listing) => format!(
                        "listing (page_size={}, fetch_details={})",
                        listing.page_size, listing.fetch_details
                    ),
                };
                info!(
                    entity = %job.entity,
                    endpoint = %config.api.endpoint(job.family().endpoint_path()),
                    id_space = %id_space,
                    concurrency = job.concurrency,
                    batch_delay_ms = job.batch_delay_ms,
                    max_retries = job.max_retries,
                    chunk_size = job.chunk_size(),
                    "Configured job"
                );
            }
            Ok(())
        },
    }
}

/// Run jobs sequentially; only fatal errors stop the remaining jobs
async fn run(config: &HarvestConfig, entities: &[EntityKind], output: Option<PathBuf>, progress: bool) -> Result<()> {
    let mut harvester = Harvester::new(config)?.with_progress(progress);
    if let Some(dir) = output {
        harvester = harvester.with_output_dir(dir);
    }

    let jobs = config.select_jobs(entities);
    info!(jobs = jobs.len(), output = %harvester.output_dir().display(), "Starting run");

    let mut abandoned = 0;
    for job in &jobs {
        match harvester.run_job(job).await {
            Ok(_) => {},
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("Harvest of {} aborted", job.entity));
            },
            Err(e) => {
                error!(entity = %job.entity, error = %e, "Job abandoned");
                abandoned += 1;
            },
        }
    }

    info!(completed = jobs.len() - abandoned, abandoned, "Run complete");
    Ok(())
}
