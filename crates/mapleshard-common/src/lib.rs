//! Mapleshard Common Library
//!
//! Shared types, logging, and error handling for the Mapleshard workspace.
//!
//! - **Error Handling**: the [`Error`] enum and [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: the shard/manifest contract consumed by downstream readers
//!
//! # Example
//!
//! ```no_run
//! use mapleshard_common::types::{EntityKind, Manifest};
//!
//! fn shard_files(manifest: &Manifest) -> Vec<&str> {
//!     manifest.chunks.iter().map(|c| c.file.as_str()).collect()
//! }
//!
//! assert_eq!(EntityKind::Mob.manifest_file_name(), "mob-index.json");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
