//! Mapleshard Harvest Library
//!
//! Harvests sparse, id-addressed game data (items, mobs, NPCs, maps) from a
//! read-only REST API and repackages it into size-bounded JSON shards plus an
//! index manifest.
//!
//! # Pipeline
//!
//! - **enumerator**: configured id ranges or the upstream listing
//! - **client**: one lookup per id, 404 as a valid negative result, retries
//!   with linear capped backoff
//! - **scheduler**: fixed-width batches joined before the next one starts
//! - **families**: per-family normalization into the storage shape
//! - **aggregator**: keyed dataset with periodic checkpoints
//! - **partition**: deterministic shards and manifest
//!
//! # Example
//!
//! ```no_run
//! use mapleshard_common::types::EntityKind;
//! use mapleshard_harvest::config::{HarvestConfig, JobConfig};
//! use mapleshard_harvest::pipeline::Harvester;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarvestConfig::default();
//!     let harvester = Harvester::new(&config)?.with_output_dir("./data");
//!     let report = harvester.run_job(&JobConfig::for_kind(EntityKind::Mob)).await?;
//!     assert_eq!(report.total_items, report.stats.succeeded - report.replaced);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregator;
pub mod client;
pub mod config;
pub mod enumerator;
pub mod families;
pub mod partition;
pub mod pipeline;
pub mod repartition;
pub mod scheduler;
pub mod stats;

pub use aggregator::Dataset;
pub use client::{FetchClient, FetchOutcome};
pub use config::HarvestConfig;
pub use families::{family, EntityFamily, EntityPayload};
pub use pipeline::{Harvester, RunReport};
pub use stats::HarvestStats;
