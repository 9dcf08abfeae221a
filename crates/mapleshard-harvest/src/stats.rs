//! Run statistics

use serde::Serialize;

/// Per-run tallies, created by the scheduler and updated only at batch joins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    /// Candidate ids handed to the scheduler, duplicates included
    pub candidates: usize,
    pub batches: usize,
    pub succeeded: usize,
    /// 404s; expected for most of a sparse id space
    pub absent: usize,
    /// Retries exhausted on a transient failure
    pub skipped: usize,
    /// Refused outright by upstream (4xx other than 404/408/429)
    pub rejected: usize,
    /// Retries performed across all fetches
    pub retries: u64,
}

impl HarvestStats {
    pub fn new(candidates: usize) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Stats for objects taken straight from a listing, without per-id fetches
    pub fn listed(count: usize) -> Self {
        Self {
            candidates: count,
            succeeded: count,
            ..Self::default()
        }
    }

    /// Candidates with a terminal outcome so far
    pub fn processed(&self) -> usize {
        self.succeeded + self.absent + self.skipped + self.rejected
    }

    pub fn failures(&self) -> usize {
        self.skipped + self.rejected
    }
}
