use super::fields::{array, flag, id_list, int, text};
use super::{decode_record, name_or, EntityFamily, EntityPayload};
use crate::enumerator::IdRange;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MapRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub street_name: String,
    #[serde(default)]
    pub continent: String,
    #[serde(default)]
    pub is_town: bool,
    #[serde(default)]
    pub return_map: i64,
    #[serde(default)]
    pub mobs: Vec<EntityId>,
    #[serde(default)]
    pub npcs: Vec<EntityId>,
    #[serde(default)]
    pub portal_count: usize,
}

/// Continent a map belongs to, derived from the leading digit of its id
pub fn continent(id: EntityId) -> &'static str {
    match id / 100_000_000 {
        0 => "Maple Island",
        1 => "Victoria Island",
        2 => "Ossyria",
        3 => "Edelstein",
        5 | 7 => "World Tour",
        6 => "Masteria",
        8 => "Zipangu",
        9 => "Special",
        _ => "Other",
    }
}

pub struct MapFamily;

impl EntityFamily for MapFamily {
    fn kind(&self) -> EntityKind {
        EntityKind::Map
    }

    fn default_chunk_size(&self) -> usize {
        500
    }

    fn default_id_ranges(&self) -> Vec<IdRange> {
        vec![
            IdRange::new(0, 9_999),
            IdRange::new(100_000_000, 100_009_999),
            IdRange::new(200_000_000, 200_009_999),
        ]
    }

    fn normalize(&self, id: EntityId, raw: &Value) -> EntityPayload {
        let street_name = text(raw, &["streetName"]);
        let name = name_or(text(raw, &["name"]), || {
            if street_name.is_empty() {
                format!("Map {}", id)
            } else {
                format!("{} {}", street_name, id)
            }
        });

        EntityPayload::Map(MapRecord {
            id,
            name,
            street_name,
            continent: continent(id).to_string(),
            is_town: flag(raw, &["isTown"]),
            return_map: int(raw, &["returnMap"]),
            mobs: id_list(raw, &["mobs"]),
            npcs: id_list(raw, &["npcs"]),
            portal_count: array(raw, &["portals"]).len(),
        })
    }

    fn decode(&self, value: Value) -> Result<EntityPayload> {
        decode_record(self.kind(), value).map(EntityPayload::Map)
    }
}
