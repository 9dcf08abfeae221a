//! Aggregator and checkpointer
//!
//! The [`Dataset`] is the single in-memory collection for a run, keyed by id
//! with last-write-wins inserts. The [`Aggregator`] is the scheduler's sink:
//! it normalizes each successful payload, inserts it, and periodically writes
//! a checkpoint so a crash loses at most one interval of work.
//!
//! Checkpoints have the same shape as a shard (stringified id to entity, in
//! ascending id order). A resumed run starts from the beginning of the id
//! space; the checkpoint is only there to be inspected or re-partitioned.

use crate::families::{family, EntityFamily, EntityPayload};
use crate::scheduler::BatchSink;
use crate::stats::HarvestStats;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::{Error, Result};
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// Dataset
// ============================================================================

/// Keyed collection of normalized entities of one family
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    kind: EntityKind,
    entries: BTreeMap<EntityId, EntityPayload>,
}

impl Dataset {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Insert or overwrite by id, returning the replaced entity
    pub fn insert(&mut self, entity: EntityPayload) -> Option<EntityPayload> {
        self.entries.insert(entity.id(), entity)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityPayload> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending id order
    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, EntityPayload> {
        self.entries.iter()
    }

    /// Entity count per family bucket
    pub fn distribution(&self) -> BTreeMap<String, usize> {
        let mut buckets = BTreeMap::new();
        for entity in self.entries.values() {
            *buckets.entry(entity.bucket()).or_insert(0) += 1;
        }
        buckets
    }

    /// Compact shard-shaped JSON
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }

    /// Decode a shard-shaped JSON object of already-normalized records
    pub fn from_value(kind: EntityKind, value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::invalid_dataset(format!(
                "Expected a JSON object of {} records",
                kind
            )));
        };

        let family = family(kind);
        let mut dataset = Self::new(kind);
        for (key, record) in object {
            let id: EntityId = key
                .parse()
                .map_err(|_| Error::invalid_dataset(format!("Key {:?} is not an entity id", key)))?;

            let entity = family.decode(record)?;
            if entity.id() != id {
                return Err(Error::invalid_dataset(format!(
                    "Record under key {} has id {}",
                    id,
                    entity.id()
                )));
            }
            dataset.insert(entity);
        }

        Ok(dataset)
    }

    /// Read a checkpoint or shard file
    pub fn load(path: &Path, kind: EntityKind) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Self::from_value(kind, value)
    }
}

impl IntoIterator for Dataset {
    type Item = (EntityId, EntityPayload);
    type IntoIter = btree_map::IntoIter<EntityId, EntityPayload>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// Checkpointer
// ============================================================================

/// When to snapshot the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    EveryBatch,
    EveryInsertions(usize),
}

impl From<Option<usize>> for CheckpointPolicy {
    fn from(every: Option<usize>) -> Self {
        match every {
            Some(n) if n > 0 => CheckpointPolicy::EveryInsertions(n),
            _ => CheckpointPolicy::EveryBatch,
        }
    }
}

#[derive(Debug)]
pub struct Checkpointer {
    path: PathBuf,
    policy: CheckpointPolicy,
    pending: usize,
    written: usize,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, policy: CheckpointPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            pending: 0,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checkpoints written so far
    pub fn written(&self) -> usize {
        self.written
    }

    fn after_insert(&mut self, dataset: &Dataset) -> Result<()> {
        self.pending += 1;
        match self.policy {
            CheckpointPolicy::EveryInsertions(n) if self.pending >= n => self.write(dataset),
            _ => Ok(()),
        }
    }

    fn after_batch(&mut self, dataset: &Dataset) -> Result<()> {
        match self.policy {
            CheckpointPolicy::EveryBatch => self.write(dataset),
            CheckpointPolicy::EveryInsertions(_) => Ok(()),
        }
    }

    /// Snapshot the dataset now
    pub fn write(&mut self, dataset: &Dataset) -> Result<()> {
        write_atomic(&self.path, &dataset.to_json_bytes()?)?;
        self.pending = 0;
        self.written += 1;
        debug!(path = %self.path.display(), items = dataset.len(), "Checkpoint written");
        Ok(())
    }
}

/// Write through a sibling `.tmp` file and rename it over the target
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

// ============================================================================
// Aggregator
// ============================================================================

/// Normalizing sink that owns the run's dataset
pub struct Aggregator {
    family: &'static dyn EntityFamily,
    dataset: Dataset,
    checkpointer: Checkpointer,
    replaced: usize,
}

impl Aggregator {
    pub fn new(family: &'static dyn EntityFamily, checkpointer: Checkpointer) -> Self {
        Self {
            family,
            dataset: Dataset::new(family.kind()),
            checkpointer,
            replaced: 0,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Entries overwritten by a later insert of the same id
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    /// Normalize a raw upstream payload and insert it
    pub fn insert_raw(&mut self, id: EntityId, raw: &Value) -> Result<()> {
        self.insert(self.family.normalize(id, raw))
    }

    pub fn insert(&mut self, entity: EntityPayload) -> Result<()> {
        if let Some(previous) = self.dataset.insert(entity) {
            debug!(id = previous.id(), "Replaced existing entry");
            self.replaced += 1;
        }
        self.checkpointer.after_insert(&self.dataset)
    }

    /// Write the final checkpoint and hand over the dataset
    pub fn finish(mut self) -> Result<(Dataset, usize)> {
        self.checkpointer.write(&self.dataset)?;
        info!(
            items = self.dataset.len(),
            replaced = self.replaced,
            checkpoints = self.checkpointer.written(),
            path = %self.checkpointer.path().display(),
            "Final checkpoint written"
        );
        Ok((self.dataset, self.replaced))
    }
}

impl BatchSink for Aggregator {
    fn accept(&mut self, id: EntityId, payload: Value) -> Result<()> {
        self.insert_raw(id, &payload)
    }

    fn batch_complete(&mut self, _batch: usize, _stats: &HarvestStats) -> Result<()> {
        self.checkpointer.after_batch(&self.dataset)
    }
}
