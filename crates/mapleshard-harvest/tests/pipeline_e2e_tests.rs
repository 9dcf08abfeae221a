//! End-to-end harvest runs against a mock upstream
//!
//! Each test drives `Harvester::run_job` through enumeration, fetching,
//! normalization, checkpointing and partitioning, then inspects the files
//! written to a temporary output directory.

use mapleshard_common::types::{EntityKind, Manifest};
use mapleshard_common::Error;
use mapleshard_harvest::config::{ApiConfig, HarvestConfig, JobConfig, ListingConfig, OutputConfig};
use mapleshard_harvest::enumerator::IdRange;
use mapleshard_harvest::pipeline::Harvester;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn config(server: &MockServer, output: &Path) -> HarvestConfig {
    HarvestConfig {
        api: ApiConfig {
            base_url: server.uri(),
            retry_delay_ms: 1,
            max_retry_delay_ms: 5,
            ..ApiConfig::default()
        },
        output: OutputConfig {
            dir: output.to_path_buf(),
            checkpoint_every: None,
        },
        jobs: Vec::new(),
    }
}

fn job(entity: EntityKind, ranges: Vec<IdRange>, chunk_size: usize) -> JobConfig {
    JobConfig {
        id_ranges: Some(ranges),
        concurrency: 2,
        batch_delay_ms: 0,
        chunk_size: Some(chunk_size),
        ..JobConfig::for_kind(entity)
    }
}

async fn mount_entity(server: &MockServer, entity: &str, id: u32, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/GMS/83/{}/{}", entity, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn read_manifest(path: &Path) -> Manifest {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// ============================================================================
// Range Scans
// ============================================================================

#[tokio::test]
async fn test_three_entities_into_two_shards() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_entity(&server, "mob", 1, json!({ "id": 1, "name": "A" })).await;
    mount_entity(&server, "mob", 2, json!({ "id": 2, "name": "B" })).await;
    mount_entity(&server, "mob", 3, json!({ "id": 3, "name": "C" })).await;
    // Everything else falls through to wiremock's default 404

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester
        .run_job(&job(EntityKind::Mob, vec![IdRange::new(1, 6)], 2))
        .await
        .unwrap();

    assert_eq!(report.stats.candidates, 6);
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.absent, 3);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.total_items, 3);
    assert_eq!(report.chunks, 2);

    let manifest = read_manifest(&out.path().join("mob-index.json"));
    assert_eq!(manifest.total_items, 3);
    let counts: Vec<_> = manifest.chunks.iter().map(|c| c.count).collect();
    assert_eq!(counts, vec![2, 1]);
    assert_eq!(manifest.chunks[0].file, "mob-1.json");
    assert_eq!(manifest.chunks[1].range, "3-3");

    let first = read_json(&out.path().join("mob-1.json"));
    assert_eq!(first["1"]["name"], "A");
    assert_eq!(first["2"]["name"], "B");
    let second = read_json(&out.path().join("mob-2.json"));
    assert_eq!(second.as_object().unwrap().len(), 1);
    assert_eq!(second["3"]["name"], "C");

    // Final checkpoint stays next to the shards
    let checkpoint = read_json(&out.path().join("mob-checkpoint.json"));
    assert_eq!(checkpoint.as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn test_absent_id_never_reaches_the_dataset() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/npc/42"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester
        .run_job(&job(EntityKind::Npc, vec![IdRange::new(42, 42)], 10))
        .await
        .unwrap();

    assert_eq!(report.stats.absent, 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.stats.failures(), 0);
    assert_eq!(report.total_items, 0);

    let manifest = read_manifest(&out.path().join("npc-index.json"));
    assert_eq!(manifest.total_items, 0);
    assert!(manifest.chunks.is_empty());
}

#[tokio::test]
async fn test_retried_entity_is_harvested_and_failures_do_not_abort() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/item/7"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_entity(
        &server,
        "item",
        7,
        json!({ "id": 7, "description": { "name": "Red Potion" }, "typeInfo": { "overallCategory": "Use" } }),
    )
    .await;

    // Always failing and refused ids alongside it
    Mock::given(method("GET"))
        .and(path("/GMS/83/item/8"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GMS/83/item/9"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    mount_entity(&server, "item", 10, json!({ "id": 10, "typeInfo": { "subCategory": "Potion" } })).await;

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester
        .run_job(&job(EntityKind::Item, vec![IdRange::new(7, 10)], 100))
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.rejected, 1);
    assert_eq!(report.stats.retries, 3 + 3);
    assert_eq!(report.total_items, 2);
    assert_eq!(report.distribution.get("Use"), Some(&1));

    let shard = read_json(&out.path().join("item-1.json"));
    assert_eq!(shard["7"]["name"], "Red Potion");
    assert_eq!(shard["10"]["name"], "Potion 10");
    assert!(shard.get("8").is_none());
    assert!(shard.get("9").is_none());
}

#[tokio::test]
async fn test_overlapping_ranges_last_write_wins() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/map/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 3, "name": "Old" })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_entity(&server, "map", 3, json!({ "id": 3, "name": "New" })).await;
    mount_entity(&server, "map", 2, json!({ "id": 2, "name": "Two" })).await;

    let mut job = job(EntityKind::Map, vec![IdRange::new(1, 3), IdRange::new(2, 3)], 10);
    job.concurrency = 1;

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester.run_job(&job).await.unwrap();

    assert_eq!(report.stats.candidates, 5);
    assert_eq!(report.stats.succeeded, 4);
    assert_eq!(report.replaced, 2);
    assert_eq!(report.total_items, 2);

    let shard = read_json(&out.path().join("map-1.json"));
    assert_eq!(shard["3"]["name"], "New");
    assert_eq!(shard["3"]["continent"], "Maple Island");
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_listing_without_detail_fetches() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/mob"))
        .and(query_param("startPosition", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 100100, "name": "Snail", "level": 1 },
            { "name": "no id" },
            { "id": 100101, "name": "Blue Snail", "level": 2 }
        ])))
        .mount(&server)
        .await;

    let job = JobConfig {
        listing: Some(ListingConfig {
            page_size: 10,
            fetch_details: false,
        }),
        batch_delay_ms: 0,
        ..JobConfig::for_kind(EntityKind::Mob)
    };

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester.run_job(&job).await.unwrap();

    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.total_items, 2);
    assert_eq!(report.distribution.get("Lv 1-10"), Some(&2));

    let shard = read_json(&out.path().join("mob-1.json"));
    assert_eq!(shard["100101"]["name"], "Blue Snail");
}

#[tokio::test]
async fn test_listing_with_detail_fetches() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/npc"))
        .and(query_param("startPosition", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 9000000 }, { "id": 9000001 }])))
        .mount(&server)
        .await;
    mount_entity(&server, "npc", 9000000, json!({ "name": "Paul", "isShop": true })).await;
    // 9000001 is listed but gone by the time it is fetched

    let job = JobConfig {
        listing: Some(ListingConfig {
            page_size: 50,
            fetch_details: true,
        }),
        batch_delay_ms: 0,
        ..JobConfig::for_kind(EntityKind::Npc)
    };

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let report = harvester.run_job(&job).await.unwrap();

    assert_eq!(report.stats.candidates, 2);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.absent, 1);
    assert_eq!(report.distribution.get("shop"), Some(&1));
}

#[tokio::test]
async fn test_failed_listing_abandons_job_without_output() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/item"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let job = JobConfig {
        listing: Some(ListingConfig::default()),
        ..JobConfig::for_kind(EntityKind::Item)
    };

    let harvester = Harvester::new(&config(&server, out.path())).unwrap();
    let err = harvester.run_job(&job).await.unwrap_err();

    assert!(matches!(err, Error::Upstream(_)));
    assert!(!err.is_fatal());
    assert!(!out.path().join("item-index.json").exists());
    assert!(!out.path().join("item-1.json").exists());
}

// ============================================================================
// Fatal Output Errors
// ============================================================================

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let blocked = out.path().join("not-a-dir");
    std::fs::write(&blocked, b"file in the way").unwrap();

    mount_entity(&server, "mob", 1, json!({ "id": 1, "name": "A" })).await;

    let harvester = Harvester::new(&config(&server, &blocked)).unwrap();
    let err = harvester
        .run_job(&job(EntityKind::Mob, vec![IdRange::new(1, 1)], 10))
        .await
        .unwrap_err();

    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let server = MockServer::start().await;
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    for id in 1..=5 {
        mount_entity(&server, "mob", id, json!({ "id": id, "name": format!("Mob #{}", id), "meta": { "level": id } })).await;
    }
    let job = job(EntityKind::Mob, vec![IdRange::new(1, 5)], 2);

    Harvester::new(&config(&server, first.path())).unwrap().run_job(&job).await.unwrap();
    Harvester::new(&config(&server, second.path())).unwrap().run_job(&job).await.unwrap();

    for n in 1..=3 {
        let file = format!("mob-{}.json", n);
        assert_eq!(
            std::fs::read(first.path().join(&file)).unwrap(),
            std::fs::read(second.path().join(&file)).unwrap()
        );
    }
}
