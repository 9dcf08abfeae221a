//! Entity families
//!
//! Every harvested domain (items, mobs, NPCs, maps) is described by one value
//! implementing [`EntityFamily`]. The engine never branches on the entity
//! kind itself; it asks the family for the endpoint, the defaults, and the
//! normalization of a raw upstream payload.

pub mod fields;
mod item;
mod map;
mod mob;
mod npc;

pub use item::{ItemFamily, ItemRecord};
pub use map::{MapFamily, MapRecord};
pub use mob::{MobFamily, MobRecord};
pub use npc::{NpcFamily, NpcLocation, NpcRecord};

use crate::enumerator::IdRange;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Per-family behaviour plugged into the harvesting engine
pub trait EntityFamily: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Path segment after `{base}/{region}/{version}/`
    fn endpoint_path(&self) -> &'static str {
        self.kind().as_str()
    }

    fn default_chunk_size(&self) -> usize;

    fn default_id_ranges(&self) -> Vec<IdRange>;

    /// Map a raw upstream payload to the storage shape.
    ///
    /// Total over any JSON value: missing or malformed optional fields become
    /// zero/empty, and a missing name is synthesized.
    fn normalize(&self, id: EntityId, raw: &Value) -> EntityPayload;

    /// Decode an already-normalized record (checkpoint or shard contents)
    fn decode(&self, value: Value) -> Result<EntityPayload>;
}

/// Look up the family implementation for a kind
pub fn family(kind: EntityKind) -> &'static dyn EntityFamily {
    match kind {
        EntityKind::Item => &ItemFamily,
        EntityKind::Mob => &MobFamily,
        EntityKind::Npc => &NpcFamily,
        EntityKind::Map => &MapFamily,
    }
}

/// Normalized, storage-ready record for one entity
///
/// Serialized without a tag: a shard only ever holds one family, and readers
/// know which family they asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityPayload {
    Item(ItemRecord),
    Mob(MobRecord),
    Npc(NpcRecord),
    Map(MapRecord),
}

impl EntityPayload {
    pub fn id(&self) -> EntityId {
        match self {
            EntityPayload::Item(r) => r.id,
            EntityPayload::Mob(r) => r.id,
            EntityPayload::Npc(r) => r.id,
            EntityPayload::Map(r) => r.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityPayload::Item(r) => &r.name,
            EntityPayload::Mob(r) => &r.name,
            EntityPayload::Npc(r) => &r.name,
            EntityPayload::Map(r) => &r.name,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Item(_) => EntityKind::Item,
            EntityPayload::Mob(_) => EntityKind::Mob,
            EntityPayload::Npc(_) => EntityKind::Npc,
            EntityPayload::Map(_) => EntityKind::Map,
        }
    }

    /// Bucket used for the distribution table in the run report
    pub fn bucket(&self) -> String {
        match self {
            EntityPayload::Item(r) => r.bucket(),
            EntityPayload::Mob(r) => r.bucket(),
            EntityPayload::Npc(r) => r.bucket().to_string(),
            EntityPayload::Map(r) => r.continent.clone(),
        }
    }
}

/// Use `name` unless it is blank, otherwise build one from `fallback`
pub(crate) fn name_or(name: String, fallback: impl FnOnce() -> String) -> String {
    if name.trim().is_empty() {
        fallback()
    } else {
        name
    }
}

pub(crate) fn decode_record<T: DeserializeOwned>(kind: EntityKind, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::invalid_dataset(format!("Not a normalized {} record: {}", kind, e)))
}
