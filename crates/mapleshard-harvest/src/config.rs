//! Harvest configuration
//!
//! A static TOML declaration of the upstream API, the output directory, and
//! one `[[jobs]]` entry per entity family. Anything a job leaves out falls
//! back to the family defaults, and a missing file means "all four families
//! with defaults".
//!
//! ```toml
//! [api]
//! base_url = "https://maplestory.io/api"
//! region = "GMS"
//! version = "83"
//!
//! [output]
//! dir = "./data"
//!
//! [[jobs]]
//! entity = "mob"
//! id_ranges = [{ start = 100000, end = 100999 }]
//! concurrency = 20
//! batch_delay_ms = 100
//! ```

use crate::client::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY_MS, DEFAULT_RETRY_DELAY_MS};
use crate::enumerator::IdRange;
use crate::families::{family, EntityFamily};
use mapleshard_common::types::EntityKind;
use mapleshard_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// ============================================================================
// Defaults
// ============================================================================

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "harvest.toml";

pub const DEFAULT_API_BASE: &str = "https://maplestory.io/api";
pub const DEFAULT_REGION: &str = "GMS";
pub const DEFAULT_VERSION: &str = "83";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 100;
pub const DEFAULT_LISTING_PAGE_SIZE: usize = 500;

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_max_retry_delay_ms() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_MS
}

fn default_user_agent() -> String {
    format!("mapleshard/{}", env!("CARGO_PKG_VERSION"))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_batch_delay_ms() -> u64 {
    DEFAULT_BATCH_DELAY_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_page_size() -> usize {
    DEFAULT_LISTING_PAGE_SIZE
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Sections
// ============================================================================

/// Upstream API location and request behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            region: default_region(),
            version: default_version(),
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// `{base}/{region}/{version}/{path}`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.region,
            self.version,
            path
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where shards, manifests and checkpoints are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Checkpoint after this many insertions; unset means after every batch
    #[serde(default)]
    pub checkpoint_every: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            checkpoint_every: None,
        }
    }
}

/// Enumerate through the upstream listing endpoint instead of ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Fetch each listed id individually instead of normalizing the rows
    #[serde(default = "default_true")]
    pub fetch_details: bool,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            fetch_details: true,
        }
    }
}

/// How a job discovers its candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSpace {
    Ranges(Vec<IdRange>),
    Listing(ListingConfig),
}

/// One entity family to harvest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub entity: EntityKind,
    /// Inclusive ranges; omitted means the family's default ranges
    #[serde(default)]
    pub id_ranges: Option<Vec<IdRange>>,
    #[serde(default)]
    pub listing: Option<ListingConfig>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Omitted means the family's default chunk size
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl JobConfig {
    /// A job with every setting at its default
    pub fn for_kind(entity: EntityKind) -> Self {
        Self {
            entity,
            id_ranges: None,
            listing: None,
            concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            chunk_size: None,
        }
    }

    pub fn family(&self) -> &'static dyn EntityFamily {
        family(self.entity)
    }

    pub fn id_space(&self) -> IdSpace {
        match (&self.listing, &self.id_ranges) {
            (Some(listing), _) => IdSpace::Listing(*listing),
            (None, Some(ranges)) => IdSpace::Ranges(ranges.clone()),
            (None, None) => IdSpace::Ranges(self.family().default_id_ranges()),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
            .unwrap_or_else(|| self.family().default_chunk_size())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn retry_policy(&self, api: &ApiConfig) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(api.retry_delay_ms),
            max_delay: Duration::from_millis(api.max_retry_delay_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let entity = self.entity;
        if self.concurrency == 0 {
            return Err(Error::config(format!("{}: concurrency must be greater than 0", entity)));
        }
        if self.chunk_size == Some(0) {
            return Err(Error::config(format!("{}: chunk_size must be greater than 0", entity)));
        }
        if let Some(listing) = &self.listing {
            if self.id_ranges.is_some() {
                return Err(Error::config(format!(
                    "{}: id_ranges and listing are mutually exclusive",
                    entity
                )));
            }
            if listing.page_size == 0 {
                return Err(Error::config(format!("{}: listing page_size must be greater than 0", entity)));
            }
        }
        if let Some(ranges) = &self.id_ranges {
            if ranges.is_empty() {
                return Err(Error::config(format!("{}: no id_ranges and no listing configured", entity)));
            }
            if let Some(bad) = ranges.iter().find(|r| r.is_empty()) {
                return Err(Error::config(format!(
                    "{}: range start {} is after end {}",
                    entity, bad.start, bad.end
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Top-level
// ============================================================================

/// Complete harvest configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            output: OutputConfig::default(),
            jobs: EntityKind::ALL.iter().copied().map(JobConfig::for_kind).collect(),
        }
    }
}

impl HarvestConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid config: {}", e)))
    }

    /// Load and validate the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, `harvest.toml` in the
    /// working directory is used if present, otherwise the built-in defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::read(Path::new(DEFAULT_CONFIG_FILE))?,
            None => {
                info!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            },
        };

        let config = config.with_env()?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), jobs = config.jobs.len(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// - `MAPLESHARD_API_BASE`, `MAPLESHARD_REGION`, `MAPLESHARD_VERSION`
    /// - `MAPLESHARD_TIMEOUT_SECS`
    /// - `MAPLESHARD_OUTPUT_DIR`
    ///
    /// An unparsable timeout is a configuration error rather than ignored.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(base) = std::env::var("MAPLESHARD_API_BASE") {
            self.api.base_url = base;
        }
        if let Ok(region) = std::env::var("MAPLESHARD_REGION") {
            self.api.region = region;
        }
        if let Ok(version) = std::env::var("MAPLESHARD_VERSION") {
            self.api.version = version;
        }
        if let Ok(timeout) = std::env::var("MAPLESHARD_TIMEOUT_SECS") {
            self.api.timeout_secs = timeout.trim().parse().map_err(|_| {
                Error::config(format!(
                    "MAPLESHARD_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    timeout
                ))
            })?;
        }
        if let Ok(dir) = std::env::var("MAPLESHARD_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::config("api.base_url must not be empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(Error::config("api.timeout_secs must be greater than 0"));
        }
        if self.output.checkpoint_every == Some(0) {
            return Err(Error::config("output.checkpoint_every must be greater than 0"));
        }
        for job in &self.jobs {
            job.validate()?;
        }
        Ok(())
    }

    /// Jobs to run for `kinds`, or every configured job when `kinds` is empty.
    /// A kind with no configured job runs with defaults.
    pub fn select_jobs(&self, kinds: &[EntityKind]) -> Vec<JobConfig> {
        if kinds.is_empty() {
            return self.jobs.clone();
        }

        kinds
            .iter()
            .map(|kind| {
                self.jobs
                    .iter()
                    .find(|job| job.entity == *kind)
                    .cloned()
                    .unwrap_or_else(|| JobConfig::for_kind(*kind))
            })
            .collect()
    }
}
