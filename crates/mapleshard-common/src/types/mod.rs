//! Types shared between the harvester and readers of its output
//!
//! The shard files and the manifest are the only contract a downstream
//! reader depends on, so their shapes live here rather than in the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric identifier of an entity within its family
pub type EntityId = u32;

/// Entity families the harvester knows how to collect
///
/// Serialized as the singular lowercase name; deserialized through
/// [`FromStr`](std::str::FromStr) so configuration accepts the same aliases
/// as the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum EntityKind {
    Item,
    Mob,
    Npc,
    Map,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Item,
        EntityKind::Mob,
        EntityKind::Npc,
        EntityKind::Map,
    ];

    /// Name used both as the upstream path segment and the output file prefix
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Mob => "mob",
            EntityKind::Npc => "npc",
            EntityKind::Map => "map",
        }
    }

    /// `{kind}-{n}.json`, numbered from 1
    pub fn shard_file_name(self, n: usize) -> String {
        format!("{}-{}.json", self.as_str(), n)
    }

    pub fn manifest_file_name(self) -> String {
        format!("{}-index.json", self.as_str())
    }

    pub fn checkpoint_file_name(self) -> String {
        format!("{}-checkpoint.json", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "item" | "items" => Ok(EntityKind::Item),
            "mob" | "mobs" | "monster" | "monsters" => Ok(EntityKind::Mob),
            "npc" | "npcs" => Ok(EntityKind::Npc),
            "map" | "maps" => Ok(EntityKind::Map),
            other => Err(crate::Error::config(format!("Unknown entity kind: {}", other))),
        }
    }
}

impl TryFrom<String> for EntityKind {
    type Error = crate::Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index file describing how one dataset was split into shards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub total_items: usize,
    pub chunks: Vec<ChunkEntry>,
    pub generated: DateTime<Utc>,
}

/// One shard as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// File name relative to the manifest's directory
    pub file: String,
    pub count: usize,
    /// Human-readable id range, `"{first}-{last}"`
    pub range: String,
}

impl Manifest {
    /// Sum of the declared shard counts
    pub fn declared_items(&self) -> usize {
        self.chunks.iter().map(|c| c.count).sum()
    }
}
