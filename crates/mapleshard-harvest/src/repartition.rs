//! Re-partitioning from already-normalized artifacts
//!
//! Input is either a checkpoint-shaped dataset file or an existing manifest
//! together with the shards it lists. Shards are resolved relative to the
//! manifest's directory and must agree with the manifest's counts.

use crate::aggregator::Dataset;
use crate::partition::{partition, write_partition};
use mapleshard_common::types::{EntityKind, Manifest};
use mapleshard_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the normalized dataset comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// Checkpoint or single shard file
    Dataset(PathBuf),
    /// `{kind}-index.json` plus its shards
    Manifest(PathBuf),
}

impl DatasetSource {
    pub fn load(&self, kind: EntityKind) -> Result<Dataset> {
        match self {
            DatasetSource::Dataset(path) => Dataset::load(path, kind),
            DatasetSource::Manifest(path) => load_from_manifest(path, kind),
        }
    }
}

/// Rebuild a dataset from a manifest, checking every declared count
pub fn load_from_manifest(path: &Path, kind: EntityKind) -> Result<Dataset> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let manifest: Manifest = serde_json::from_slice(&bytes)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    if manifest.declared_items() != manifest.total_items {
        return Err(Error::manifest_mismatch(format!(
            "Chunks declare {} items but totalItems is {}",
            manifest.declared_items(),
            manifest.total_items
        )));
    }

    let mut dataset = Dataset::new(kind);
    for chunk in &manifest.chunks {
        let shard = Dataset::load(&base.join(&chunk.file), kind)?;
        if shard.len() != chunk.count {
            return Err(Error::manifest_mismatch(format!(
                "{} holds {} items, manifest declares {}",
                chunk.file,
                shard.len(),
                chunk.count
            )));
        }

        for (id, entity) in shard {
            if dataset.insert(entity).is_some() {
                return Err(Error::manifest_mismatch(format!(
                    "Entity {} appears in more than one shard",
                    id
                )));
            }
        }
        debug!(file = %chunk.file, count = chunk.count, "Shard loaded");
    }

    Ok(dataset)
}

/// Load `source` and write a fresh set of shards and manifest into `output`
pub fn repartition(
    kind: EntityKind,
    source: &DatasetSource,
    chunk_size: usize,
    output: &Path,
) -> Result<Manifest> {
    let dataset = source.load(kind)?;
    info!(entity = %kind, items = dataset.len(), chunk_size, "Re-partitioning");

    let partition = partition(&dataset, chunk_size)?;
    write_partition(output, &partition)?;
    Ok(partition.manifest)
}
