//! Error types for Mapleshard

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for Mapleshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Mapleshard
///
/// Per-entity fetch failures are never represented here; they are recovered
/// inside the harvester and only show up in run statistics.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Manifest mismatch: {0}")]
    ManifestMismatch(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn invalid_dataset(msg: impl Into<String>) -> Self {
        Self::InvalidDataset(msg.into())
    }

    pub fn manifest_mismatch(msg: impl Into<String>) -> Self {
        Self::ManifestMismatch(msg.into())
    }

    /// Whether this error must abort the whole run.
    ///
    /// Output that cannot be written (checkpoint, shard, manifest) is fatal.
    /// An abandoned job is not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_fatal() {
        let err = Error::io(
            "/tmp/out/item-1.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
        assert!(err.to_string().contains("item-1.json"));
    }

    #[test]
    fn test_upstream_errors_are_not_fatal() {
        assert!(!Error::upstream("listing failed").is_fatal());
        assert!(!Error::config("bad range").is_fatal());
    }
}
