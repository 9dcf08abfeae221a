//! End-to-end tests for the mapleshard binary
//!
//! Logging goes to stdout as JSON so assertions do not trip over ANSI codes.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn mapleshard(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mapleshard").unwrap();
    cmd.current_dir(workdir)
        .env("LOG_FORMAT", "json")
        .env("LOG_OUTPUT", "console")
        .env_remove("MAPLESHARD_API_BASE")
        .env_remove("MAPLESHARD_TIMEOUT_SECS")
        .env_remove("MAPLESHARD_OUTPUT_DIR");
    cmd
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// ============================================================================
// Entities
// ============================================================================

#[test]
fn test_entities_lists_builtin_defaults() {
    let dir = TempDir::new().unwrap();

    mapleshard(dir.path())
        .arg("entities")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configured job"))
        .stdout(predicate::str::contains("https://maplestory.io/api/GMS/83/mob"))
        .stdout(predicate::str::contains("\"entity\":\"npc\""));
}

#[test]
fn test_entities_reads_config_and_env_override() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("harvest.toml"),
        "[api]\nregion = \"KMS\"\n\n[[jobs]]\nentity = \"map\"\nconcurrency = 4\n",
    )
    .unwrap();

    mapleshard(dir.path())
        .env("MAPLESHARD_VERSION", "95")
        .arg("entities")
        .assert()
        .success()
        .stdout(predicate::str::contains("/KMS/95/map"))
        .stdout(predicate::str::contains("\"entity\":\"mob\"").not());
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();

    mapleshard(dir.path())
        .args(["--config", "nope.toml", "entities"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_config_accepts_entity_aliases() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("harvest.toml"), "[[jobs]]\nentity = \"monsters\"\n").unwrap();

    mapleshard(dir.path())
        .arg("entities")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"entity\":\"mob\""));
}

#[test]
fn test_malformed_timeout_env_fails() {
    let dir = TempDir::new().unwrap();

    mapleshard(dir.path())
        .env("MAPLESHARD_TIMEOUT_SECS", "soon")
        .arg("entities")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MAPLESHARD_TIMEOUT_SECS"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("harvest.toml"),
        "[[jobs]]\nentity = \"mob\"\nid_ranges = [{ start = 10, end = 1 }]\n",
    )
    .unwrap();

    mapleshard(dir.path()).arg("entities").assert().failure();
}

// ============================================================================
// Run
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_run_selected_entity() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/mob/100100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 100100, "name": "Snail" })))
        .mount(&server)
        .await;

    std::fs::write(
        dir.path().join("harvest.toml"),
        format!(
            r#"
[api]
base_url = "{}"
retry_delay_ms = 1

[[jobs]]
entity = "mob"
id_ranges = [{{ start = 100099, end = 100101 }}]
batch_delay_ms = 0

[[jobs]]
entity = "item"
id_ranges = [{{ start = 1, end = 1 }}]
"#,
            server.uri()
        ),
    )
    .unwrap();

    mapleshard(dir.path())
        .args(["run", "--entity", "monsters", "--output", "shards"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Harvest complete"));

    let manifest = read_json(&dir.path().join("shards").join("mob-index.json"));
    assert_eq!(manifest["totalItems"], 1);
    assert_eq!(manifest["chunks"][0]["file"], "mob-1.json");
    assert!(!dir.path().join("shards").join("item-index.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_continues_after_abandoned_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/GMS/83/item"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GMS/83/npc/9000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Paul" })))
        .mount(&server)
        .await;

    std::fs::write(
        dir.path().join("harvest.toml"),
        format!(
            r#"
[api]
base_url = "{}"
retry_delay_ms = 1
max_retry_delay_ms = 1

[output]
dir = "out"

[[jobs]]
entity = "item"
listing = {{ page_size = 10 }}
max_retries = 1

[[jobs]]
entity = "npc"
id_ranges = [{{ start = 9000000, end = 9000000 }}]
"#,
            server.uri()
        ),
    )
    .unwrap();

    mapleshard(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Job abandoned"));

    assert!(!dir.path().join("out").join("item-index.json").exists());
    let manifest = read_json(&dir.path().join("out").join("npc-index.json"));
    assert_eq!(manifest["totalItems"], 1);
}

#[test]
fn test_unknown_entity_is_rejected() {
    let dir = TempDir::new().unwrap();

    mapleshard(dir.path())
        .args(["run", "--entity", "pets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown entity kind"));
}

// ============================================================================
// Repartition
// ============================================================================

#[test]
fn test_repartition_dataset_file() {
    let dir = TempDir::new().unwrap();
    let dataset = json!({
        "1": { "id": 1, "name": "A" },
        "2": { "id": 2, "name": "B" },
        "3": { "id": 3, "name": "C" }
    });
    std::fs::write(dir.path().join("mob-checkpoint.json"), dataset.to_string()).unwrap();

    mapleshard(dir.path())
        .args([
            "repartition",
            "--entity",
            "mob",
            "--dataset",
            "mob-checkpoint.json",
            "--chunk-size",
            "2",
            "--output",
            "cdn",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Re-partition complete"));

    let manifest = read_json(&dir.path().join("cdn").join("mob-index.json"));
    assert_eq!(manifest["totalItems"], 3);
    assert_eq!(manifest["chunks"][0]["count"], 2);
    assert_eq!(manifest["chunks"][1]["count"], 1);
    assert_eq!(manifest["chunks"][1]["range"], "3-3");

    let first = read_json(&dir.path().join("cdn").join("mob-1.json"));
    assert_eq!(first["2"]["name"], "B");
}

#[test]
fn test_repartition_rejects_mismatched_manifest() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("npc-1.json"),
        json!({ "1": { "id": 1, "name": "Paul" } }).to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("npc-index.json"),
        json!({
            "totalItems": 2,
            "chunks": [{ "file": "npc-1.json", "count": 2, "range": "1-2" }],
            "generated": "2024-01-18T10:00:00Z"
        })
        .to_string(),
    )
    .unwrap();

    mapleshard(dir.path())
        .args(["repartition", "--entity", "npc", "--manifest", "npc-index.json", "--output", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Manifest mismatch"));
}

#[test]
fn test_repartition_requires_a_source() {
    let dir = TempDir::new().unwrap();

    mapleshard(dir.path())
        .args(["repartition", "--entity", "map"])
        .assert()
        .failure();
}
