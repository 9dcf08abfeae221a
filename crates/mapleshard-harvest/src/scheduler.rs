//! Bounded concurrency scheduler
//!
//! Candidates are split into consecutive batches of `concurrency` ids. All
//! fetches in a batch run concurrently and are joined before anything else
//! happens; the batch delay is slept between batches. Every state change
//! (stats, sink inserts, progress, checkpoints) happens after the join on the
//! calling task, so log ordering is deterministic and the sink needs no
//! locking.

use crate::client::{EntityFetcher, FetchOutcome};
use crate::stats::HarvestStats;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use mapleshard_common::types::EntityId;
use mapleshard_common::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Receiver of successful fetches, driven only at batch joins
pub trait BatchSink {
    fn accept(&mut self, id: EntityId, payload: Value) -> Result<()>;

    /// Called once per batch after every outcome has been accepted
    fn batch_complete(&mut self, _batch: usize, _stats: &HarvestStats) -> Result<()> {
        Ok(())
    }
}

pub struct BatchScheduler {
    concurrency: usize,
    batch_delay: Duration,
    progress: Option<ProgressBar>,
}

impl BatchScheduler {
    pub fn new(concurrency: usize, batch_delay: Duration) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config("Concurrency must be greater than 0"));
        }

        Ok(Self {
            concurrency,
            batch_delay,
            progress: None,
        })
    }

    /// Show a terminal progress bar advancing once per batch
    pub fn with_progress(mut self, label: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{msg}\n[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_message(label.to_string());
        self.progress = Some(bar);
        self
    }

    pub async fn run<F, S>(&self, ids: &[EntityId], fetcher: &F, sink: &mut S) -> Result<HarvestStats>
    where
        F: EntityFetcher + ?Sized,
        S: BatchSink + ?Sized,
    {
        let mut stats = HarvestStats::new(ids.len());
        let total_batches = ids.len().div_ceil(self.concurrency);

        if let Some(bar) = &self.progress {
            bar.set_length(ids.len() as u64);
        }

        info!(
            candidates = ids.len(),
            batches = total_batches,
            concurrency = self.concurrency,
            "Starting harvest"
        );

        for (index, batch) in ids.chunks(self.concurrency).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let outcomes = join_all(batch.iter().map(|&id| fetcher.fetch(id))).await;

            for fetched in outcomes {
                stats.retries += u64::from(fetched.retries);
                match fetched.outcome {
                    FetchOutcome::Success(payload) => {
                        sink.accept(fetched.id, payload)?;
                        stats.succeeded += 1;
                    },
                    FetchOutcome::Absent => stats.absent += 1,
                    FetchOutcome::TransientError(cause) => {
                        debug!(id = fetched.id, cause = %cause, "Skipped");
                        stats.skipped += 1;
                    },
                    FetchOutcome::FatalError(_) => stats.rejected += 1,
                }
            }

            stats.batches += 1;
            info!(
                batch = stats.batches,
                of = total_batches,
                succeeded = stats.succeeded,
                absent = stats.absent,
                skipped = stats.skipped,
                rejected = stats.rejected,
                "Batch complete"
            );
            if let Some(bar) = &self.progress {
                bar.inc(batch.len() as u64);
            }

            sink.batch_complete(stats.batches, &stats)?;
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }

        Ok(stats)
    }
}
