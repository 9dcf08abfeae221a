//! Harvest pipeline
//!
//! Enumerator -> scheduler (driving the fetch client) -> normalizer ->
//! aggregator/checkpointer -> partitioner and manifest writer, for one job.

use crate::aggregator::{Aggregator, CheckpointPolicy, Checkpointer};
use crate::client::{http_client, FetchClient};
use crate::config::{ApiConfig, HarvestConfig, IdSpace, JobConfig, OutputConfig};
use crate::enumerator::{self, list_all, with_ids};
use crate::partition::{partition, write_partition};
use crate::scheduler::BatchScheduler;
use crate::stats::HarvestStats;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Final summary of one job
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub entity: EntityKind,
    pub stats: HarvestStats,
    pub total_items: usize,
    pub chunks: usize,
    /// Entries overwritten by a later fetch of the same id
    pub replaced: usize,
    pub elapsed: Duration,
    pub distribution: BTreeMap<String, usize>,
}

impl RunReport {
    pub fn log(&self) {
        info!(
            entity = %self.entity,
            candidates = self.stats.candidates,
            batches = self.stats.batches,
            succeeded = self.stats.succeeded,
            absent = self.stats.absent,
            skipped = self.stats.skipped,
            rejected = self.stats.rejected,
            retries = self.stats.retries,
            total_items = self.total_items,
            chunks = self.chunks,
            replaced = self.replaced,
            elapsed_secs = self.elapsed.as_secs_f64(),
            "Harvest complete"
        );

        for (bucket, count) in &self.distribution {
            info!(entity = %self.entity, bucket = %bucket, count, "Distribution");
        }
    }
}

pub struct Harvester {
    api: ApiConfig,
    output: OutputConfig,
    http: Client,
    progress: bool,
}

impl Harvester {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(&config.api)?,
            api: config.api.clone(),
            output: config.output.clone(),
            progress: false,
        })
    }

    /// Override the configured output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    /// Draw a progress bar on stderr while fetching
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output.dir
    }

    /// Harvest one entity family end to end.
    ///
    /// Per-entity fetch failures only show up in the report. An error here is
    /// either an abandoned listing (not fatal) or an output failure (fatal).
    #[instrument(skip_all, fields(entity = %job.entity))]
    pub async fn run_job(&self, job: &JobConfig) -> Result<RunReport> {
        job.validate()?;
        let started = Instant::now();
        let family = job.family();
        let kind = family.kind();

        let client = FetchClient::new(
            self.http.clone(),
            self.api.endpoint(family.endpoint_path()),
            job.retry_policy(&self.api),
        );

        let dir = &self.output.dir;
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let mut aggregator = Aggregator::new(
            family,
            Checkpointer::new(
                dir.join(kind.checkpoint_file_name()),
                CheckpointPolicy::from(self.output.checkpoint_every),
            ),
        );

        info!(endpoint = client.endpoint(), "Harvesting");

        let stats = match job.id_space() {
            IdSpace::Ranges(ranges) => {
                let ids: Vec<EntityId> = enumerator::enumerate(&ranges).collect();
                self.scheduler(job, kind)?
                    .run(&ids, &client, &mut aggregator)
                    .await?
            },
            IdSpace::Listing(listing) => {
                let listed = with_ids(list_all(&client, listing.page_size).await?);
                info!(listed = listed.len(), "Listing enumerated");

                if listing.fetch_details {
                    let ids: Vec<EntityId> = listed.iter().map(|(id, _)| *id).collect();
                    self.scheduler(job, kind)?
                        .run(&ids, &client, &mut aggregator)
                        .await?
                } else {
                    for (id, raw) in &listed {
                        aggregator.insert_raw(*id, raw)?;
                    }
                    HarvestStats::listed(listed.len())
                }
            },
        };

        let (dataset, replaced) = aggregator.finish()?;
        let partition = partition(&dataset, job.chunk_size())?;
        write_partition(dir, &partition)?;

        let report = RunReport {
            entity: kind,
            stats,
            total_items: partition.manifest.total_items,
            chunks: partition.chunks.len(),
            replaced,
            elapsed: started.elapsed(),
            distribution: dataset.distribution(),
        };
        report.log();
        Ok(report)
    }

    fn scheduler(&self, job: &JobConfig, kind: EntityKind) -> Result<BatchScheduler> {
        let scheduler = BatchScheduler::new(job.concurrency, job.batch_delay())?;
        Ok(if self.progress {
            scheduler.with_progress(&format!("Harvesting {}", kind))
        } else {
            scheduler
        })
    }
}
