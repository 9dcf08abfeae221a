//! ID space enumeration
//!
//! Candidates come either from configured numeric ranges (a pure, restartable
//! expansion) or from the upstream listing endpoint, paged until exhausted.
//! Overlapping ranges are allowed and simply yield the same id twice; the
//! aggregator's keyed insert absorbs the duplicate.

use crate::families::fields;
use async_trait::async_trait;
use mapleshard_common::types::EntityId;
use mapleshard_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Upper bound on listing pages, guards against an upstream that ignores paging
pub const MAX_LISTING_PAGES: usize = 10_000;

/// Inclusive range of candidate ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: EntityId,
    pub end: EntityId,
}

impl IdRange {
    pub fn new(start: EntityId, end: EntityId) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            u64::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<EntityId> {
        self.start..=self.end
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Expand ranges into candidate ids, in declaration order
pub fn enumerate(ranges: &[IdRange]) -> impl Iterator<Item = EntityId> + '_ {
    ranges.iter().flat_map(IdRange::ids)
}

/// Number of candidates `enumerate` will yield, duplicates included
pub fn candidate_count(ranges: &[IdRange]) -> u64 {
    ranges.iter().map(IdRange::len).sum()
}

/// One page of the upstream listing endpoint
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `count` raw objects starting at `start`.
    /// An absent listing is an empty page.
    async fn page(&self, start: usize, count: usize) -> Result<Vec<Value>>;
}

/// Page through the listing until a short or empty page comes back
pub async fn list_all<P>(source: &P, page_size: usize) -> Result<Vec<Value>>
where
    P: PageSource + ?Sized,
{
    if page_size == 0 {
        return Err(Error::config("Listing page size must be greater than 0"));
    }

    let mut objects = Vec::new();
    for page_number in 0..MAX_LISTING_PAGES {
        let start = page_number * page_size;
        let page = source.page(start, page_size).await?;
        let received = page.len();
        debug!(start, received, "Listing page received");

        objects.extend(page);
        if received < page_size {
            return Ok(objects);
        }
    }

    Err(Error::upstream(format!(
        "Listing did not terminate after {} pages of {}",
        MAX_LISTING_PAGES, page_size
    )))
}

/// Listed objects that carry a usable id, paired with it
pub fn with_ids(objects: Vec<Value>) -> Vec<(EntityId, Value)> {
    objects
        .into_iter()
        .filter_map(|obj| {
            let id = fields::lookup(&obj, &["id"]).and_then(fields::entity_id)?;
            Some((id, obj))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_enumerate_ranges_in_order() {
        let ranges = [IdRange::new(5, 7), IdRange::new(1, 2)];
        let ids: Vec<_> = enumerate(&ranges).collect();
        assert_eq!(ids, vec![5, 6, 7, 1, 2]);
        assert_eq!(candidate_count(&ranges), 5);
    }

    #[test]
    fn test_enumerate_is_restartable() {
        let ranges = [IdRange::new(10, 12)];
        let first: Vec<_> = enumerate(&ranges).collect();
        let second: Vec<_> = enumerate(&ranges).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overlapping_ranges_yield_duplicates() {
        let ranges = [IdRange::new(1, 3), IdRange::new(3, 4)];
        let ids: Vec<_> = enumerate(&ranges).collect();
        assert_eq!(ids, vec![1, 2, 3, 3, 4]);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let range = IdRange::new(9, 3);
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(enumerate(&[range]).count(), 0);
    }

    struct FakeListing {
        total: usize,
        requests: Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl PageSource for FakeListing {
        async fn page(&self, start: usize, count: usize) -> Result<Vec<Value>> {
            self.requests.lock().unwrap().push((start, count));
            let end = (start + count).min(self.total);
            Ok((start..end).map(|i| json!({ "id": i + 1 })).collect())
        }
    }

    #[tokio::test]
    async fn test_list_all_pages_until_short_page() {
        let source = FakeListing {
            total: 5,
            requests: Mutex::new(Vec::new()),
        };

        let objects = list_all(&source, 2).await.unwrap();

        assert_eq!(objects.len(), 5);
        assert_eq!(*source.requests.lock().unwrap(), vec![(0, 2), (2, 2), (4, 2)]);
    }

    #[tokio::test]
    async fn test_list_all_exact_multiple_ends_on_empty_page() {
        let source = FakeListing {
            total: 4,
            requests: Mutex::new(Vec::new()),
        };

        let objects = list_all(&source, 2).await.unwrap();

        assert_eq!(objects.len(), 4);
        assert_eq!(source.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_with_ids_drops_unusable_rows() {
        let rows = vec![json!({ "id": 100100 }), json!({ "name": "x" }), json!({ "id": 0 }), json!({ "id": "200" })];
        let ids: Vec<_> = with_ids(rows).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![100100, 200]);
    }
}
