use super::fields::{flag, id_list, int, text};
use super::{decode_record, name_or, EntityFamily, EntityPayload};
use crate::enumerator::IdRange;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MobRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub mp: i64,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub is_boss: bool,
    #[serde(default)]
    pub speed: i64,
    #[serde(default)]
    pub physical_damage: i64,
    #[serde(default)]
    pub magic_damage: i64,
    /// Map ids the mob spawns in
    #[serde(default)]
    pub found_at: Vec<EntityId>,
}

impl MobRecord {
    /// Ten-level bracket, e.g. "Lv 11-20"
    pub(super) fn bucket(&self) -> String {
        if self.level < 1 {
            return "Lv ?".to_string();
        }
        let low = (self.level - 1) / 10 * 10 + 1;
        format!("Lv {}-{}", low, low.saturating_add(9))
    }
}

pub struct MobFamily;

impl MobFamily {
    /// `meta.{key}` from detail responses, falling back to the flat listing field
    fn stat(raw: &Value, meta_key: &str, flat_key: &str) -> i64 {
        match int(raw, &["meta", meta_key]) {
            0 => int(raw, &[flat_key]),
            value => value,
        }
    }
}

impl EntityFamily for MobFamily {
    fn kind(&self) -> EntityKind {
        EntityKind::Mob
    }

    fn default_chunk_size(&self) -> usize {
        1000
    }

    fn default_id_ranges(&self) -> Vec<IdRange> {
        vec![
            IdRange::new(100_000, 100_999),
            IdRange::new(1_110_000, 1_210_999),
            IdRange::new(2_100_000, 2_230_999),
        ]
    }

    fn normalize(&self, id: EntityId, raw: &Value) -> EntityPayload {
        EntityPayload::Mob(MobRecord {
            id,
            name: name_or(text(raw, &["name"]), || format!("Mob {}", id)),
            level: Self::stat(raw, "level", "level"),
            hp: Self::stat(raw, "maxHP", "maxHP"),
            mp: Self::stat(raw, "maxMP", "maxMP"),
            exp: Self::stat(raw, "exp", "exp"),
            is_boss: flag(raw, &["meta", "isBoss"]) || flag(raw, &["isBoss"]),
            speed: int(raw, &["meta", "speed"]),
            physical_damage: int(raw, &["meta", "physicalDamage"]),
            magic_damage: int(raw, &["meta", "magicDamage"]),
            found_at: id_list(raw, &["foundAt"]),
        })
    }

    fn decode(&self, value: Value) -> Result<EntityPayload> {
        decode_record(self.kind(), value).map(EntityPayload::Mob)
    }
}
