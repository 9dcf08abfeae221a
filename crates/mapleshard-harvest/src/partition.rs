//! Chunk partitioner and manifest writer
//!
//! Entities are taken in ascending id order and cut into consecutive groups
//! of at most `chunk_size`. Shard `n` (1-based) is `{kind}-{n}.json`, a flat
//! object keyed by stringified id. The manifest `{kind}-index.json` is
//! written after every shard, and leftover shards are only removed once the
//! new manifest no longer lists them, so a reader never sees an index
//! pointing at a missing file.

use crate::aggregator::{write_atomic, Dataset};
use crate::families::EntityPayload;
use chrono::Utc;
use mapleshard_common::types::{ChunkEntry, EntityId, EntityKind, Manifest};
use mapleshard_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// One shard, borrowing its entities from the dataset
#[derive(Debug)]
pub struct Chunk<'a> {
    pub file: String,
    pub entries: BTreeMap<EntityId, &'a EntityPayload>,
}

impl Chunk<'_> {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// `"{first}-{last}"`
    pub fn range(&self) -> String {
        match (self.entries.keys().next(), self.entries.keys().next_back()) {
            (Some(first), Some(last)) => format!("{}-{}", first, last),
            _ => String::new(),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }
}

/// Shards plus the manifest describing them
#[derive(Debug)]
pub struct Partition<'a> {
    pub kind: EntityKind,
    pub chunks: Vec<Chunk<'a>>,
    pub manifest: Manifest,
}

/// Split `dataset` into shards of at most `chunk_size` entities
pub fn partition(dataset: &Dataset, chunk_size: usize) -> Result<Partition<'_>> {
    if chunk_size == 0 {
        return Err(Error::config("Chunk size must be greater than 0"));
    }

    let kind = dataset.kind();
    let ordered: Vec<(&EntityId, &EntityPayload)> = dataset.iter().collect();

    let chunks: Vec<Chunk<'_>> = ordered
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, group)| Chunk {
            file: kind.shard_file_name(index + 1),
            entries: group.iter().map(|&(&id, entity)| (id, entity)).collect(),
        })
        .collect();

    let manifest = Manifest {
        total_items: dataset.len(),
        chunks: chunks
            .iter()
            .map(|chunk| ChunkEntry {
                file: chunk.file.clone(),
                count: chunk.count(),
                range: chunk.range(),
            })
            .collect(),
        generated: Utc::now(),
    };

    Ok(Partition {
        kind,
        chunks,
        manifest,
    })
}

/// Write every shard, then the manifest, then drop shards left over from a
/// larger earlier run
pub fn write_partition(dir: &Path, partition: &Partition<'_>) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    for chunk in &partition.chunks {
        let path = dir.join(&chunk.file);
        write_atomic(&path, &chunk.to_json_bytes()?)?;
        debug!(file = %chunk.file, count = chunk.count(), range = %chunk.range(), "Shard written");
    }

    let manifest_path = dir.join(partition.kind.manifest_file_name());
    write_atomic(&manifest_path, &serde_json::to_vec(&partition.manifest)?)?;

    remove_stale_shards(dir, partition.kind, partition.chunks.len())?;

    info!(
        path = %manifest_path.display(),
        total_items = partition.manifest.total_items,
        chunks = partition.chunks.len(),
        "Manifest written"
    );
    Ok(())
}

fn remove_stale_shards(dir: &Path, kind: EntityKind, written: usize) -> Result<()> {
    let mut n = written + 1;
    loop {
        let path = dir.join(kind.shard_file_name(n));
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), "Removed stale shard");
        n += 1;
    }
}
