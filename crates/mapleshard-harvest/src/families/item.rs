use super::fields::{flag, int, text};
use super::{decode_record, name_or, EntityFamily, EntityPayload};
use crate::enumerator::IdRange;
use mapleshard_common::types::{EntityId, EntityKind};
use mapleshard_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Upstream `metaInfo` stat keys and the names they are stored under
const STAT_KEYS: &[(&str, &str)] = &[
    ("incSTR", "str"),
    ("incDEX", "dex"),
    ("incINT", "int"),
    ("incLUK", "luk"),
    ("incPAD", "attack"),
    ("incMAD", "magicAttack"),
    ("incPDD", "defense"),
    ("incMDD", "magicDefense"),
    ("incACC", "accuracy"),
    ("incEVA", "avoidability"),
    ("incSpeed", "speed"),
    ("incJump", "jump"),
    ("incMHP", "hp"),
    ("incMMP", "mp"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub overall_category: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub required_level: i64,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub is_cash: bool,
    /// Non-zero combat stat deltas
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
}

impl ItemRecord {
    pub(super) fn bucket(&self) -> String {
        [&self.overall_category, &self.category]
            .into_iter()
            .find(|c| !c.is_empty())
            .cloned()
            .unwrap_or_else(|| "Uncategorized".to_string())
    }
}

pub struct ItemFamily;

impl EntityFamily for ItemFamily {
    fn kind(&self) -> EntityKind {
        EntityKind::Item
    }

    fn default_chunk_size(&self) -> usize {
        2000
    }

    fn default_id_ranges(&self) -> Vec<IdRange> {
        vec![
            IdRange::new(1_000_000, 1_009_999),
            IdRange::new(2_000_000, 2_009_999),
        ]
    }

    fn normalize(&self, id: EntityId, raw: &Value) -> EntityPayload {
        // Detail responses nest name/description; listing rows carry them flat.
        let sub_category = text(raw, &["typeInfo", "subCategory"]);
        let name = name_or(
            first_text(raw, &[&["description", "name"], &["name"]]),
            || {
                if sub_category.is_empty() {
                    format!("Item {}", id)
                } else {
                    format!("{} {}", sub_category, id)
                }
            },
        );

        let stats = STAT_KEYS
            .iter()
            .filter_map(|&(upstream, stored)| {
                let value = int(raw, &["metaInfo", upstream]);
                (value != 0).then(|| (stored.to_string(), value))
            })
            .collect();

        let required_level = match int(raw, &["metaInfo", "reqLevel"]) {
            0 => int(raw, &["requiredLevel"]),
            level => level,
        };

        EntityPayload::Item(ItemRecord {
            id,
            name,
            description: first_text(raw, &[&["description", "description"], &["desc"]]),
            overall_category: text(raw, &["typeInfo", "overallCategory"]),
            category: text(raw, &["typeInfo", "category"]),
            sub_category,
            required_level,
            price: int(raw, &["metaInfo", "price"]),
            is_cash: flag(raw, &["metaInfo", "cash"]) || flag(raw, &["isCash"]),
            stats,
        })
    }

    fn decode(&self, value: Value) -> Result<EntityPayload> {
        decode_record(self.kind(), value).map(EntityPayload::Item)
    }
}

fn first_text(raw: &Value, paths: &[&[&str]]) -> String {
    paths
        .iter()
        .map(|path| text(raw, path))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}
