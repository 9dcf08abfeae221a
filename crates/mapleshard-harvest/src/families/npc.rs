use super::fields::{array, entity_id, flag, int, lookup, text};
use super::{decode_record, name_or, EntityFamily, EntityPayload};
use crate::enumerator::IdRange;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NpcRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub is_shop: bool,
    #[serde(default)]
    pub locations: Vec<NpcLocation>,
    /// Script names attached to the NPC
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Dialogue lines in key order (d0, d1, ...)
    #[serde(default)]
    pub dialogue: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NpcLocation {
    pub map_id: EntityId,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

impl NpcRecord {
    pub(super) fn bucket(&self) -> &'static str {
        if self.is_shop {
            "shop"
        } else if !self.dialogue.is_empty() {
            "dialogue"
        } else {
            "silent"
        }
    }
}

pub struct NpcFamily;

impl NpcFamily {
    fn location(entry: &Value) -> Option<NpcLocation> {
        let map_id = ["mapId", "id"]
            .iter()
            .find_map(|&key| lookup(entry, &[key]).and_then(entity_id))?;

        // Coordinates are either flat or nested under `location`.
        let (x, y) = match lookup(entry, &["location"]) {
            Some(loc @ Value::Object(_)) => (int(loc, &["x"]), int(loc, &["y"])),
            _ => (int(entry, &["x"]), int(entry, &["y"])),
        };

        Some(NpcLocation { map_id, x, y })
    }

    fn scripts(raw: &Value) -> Vec<String> {
        array(raw, &["scripts"])
            .iter()
            .map(|entry| match entry {
                Value::String(s) => s.trim().to_string(),
                other => text(other, &["script"]),
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn dialogue(raw: &Value) -> Vec<String> {
        let Some(Value::Object(lines)) = lookup(raw, &["dialogue"]) else {
            return Vec::new();
        };

        let mut keyed: Vec<(&String, &Value)> = lines.iter().collect();
        keyed.sort_by(|(a, _), (b, _)| dialogue_order(a).cmp(&dialogue_order(b)));

        keyed
            .into_iter()
            .filter_map(|(_, line)| line.as_str())
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Sort key for dialogue entries: numeric suffix first so d10 follows d9
fn dialogue_order(key: &str) -> (u64, &str) {
    let digits = key.trim_start_matches(|c: char| !c.is_ascii_digit());
    (digits.parse().unwrap_or(u64::MAX), key)
}

impl EntityFamily for NpcFamily {
    fn kind(&self) -> EntityKind {
        EntityKind::Npc
    }

    fn default_chunk_size(&self) -> usize {
        1000
    }

    fn default_id_ranges(&self) -> Vec<IdRange> {
        vec![
            IdRange::new(1_000_000, 1_099_999),
            IdRange::new(2_000_000, 2_109_999),
            IdRange::new(9_000_000, 9_209_999),
        ]
    }

    fn normalize(&self, id: EntityId, raw: &Value) -> EntityPayload {
        EntityPayload::Npc(NpcRecord {
            id,
            name: name_or(text(raw, &["name"]), || format!("NPC {}", id)),
            is_shop: flag(raw, &["isShop"]),
            locations: array(raw, &["foundAt"])
                .iter()
                .filter_map(Self::location)
                .collect(),
            scripts: Self::scripts(raw),
            dialogue: Self::dialogue(raw),
        })
    }

    fn decode(&self, value: Value) -> Result<EntityPayload> {
        decode_record(self.kind(), value).map(EntityPayload::Npc)
    }
}
