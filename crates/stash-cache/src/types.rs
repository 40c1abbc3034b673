//! Cache types and requests.

use serde::{Deserialize, Serialize};
use stash_core::CompressionMode;
use std::path::PathBuf;

/// Transfer tuning supplied per operation. Absent or zero values fall back
/// to the engine defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub upload_concurrency: Option<usize>,
    pub download_concurrency: Option<usize>,
    /// Bytes per upload part; absent means derived from the object size.
    pub upload_part_size: Option<u64>,
    pub download_part_size: Option<u64>,
}

/// Request to save a cache entry.
#[derive(Debug, Clone)]
pub struct CacheSaveRequest {
    /// Stored object key, extension included.
    pub key: String,
    /// Glob patterns selecting what to archive.
    pub patterns: Vec<String>,
    /// Directory patterns are resolved against.
    pub base_dir: PathBuf,
    pub storage_class: Option<String>,
    pub compression: CompressionMode,
    pub transfer: TransferConfig,
    /// Archive to a temporary file before uploading instead of streaming.
    pub buffered: bool,
}

/// Request to restore a cache entry.
#[derive(Debug, Clone)]
pub struct CacheRestoreRequest {
    /// Stored object key, extension included.
    pub key: String,
    /// Prefix searched for the most recent object when `key` misses.
    pub default_key: Option<String>,
    pub compression: CompressionMode,
    pub transfer: TransferConfig,
    /// Directory the archive is extracted into.
    pub destination: PathBuf,
}

/// Result of a cache save operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The key already existed; nothing was transferred.
    Hit,
    Uploaded {
        /// Archive bytes sent to the store.
        bytes: u64,
        /// Regular files packed.
        files: u64,
        duration_ms: u64,
    },
}

/// Result of a cache restore operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Neither the key nor the default prefix matched anything.
    Miss,
    Restored {
        /// The key that was downloaded (may be a fallback).
        matched_key: String,
        /// Whether it was an exact match.
        exact_match: bool,
        bytes: u64,
        files: u64,
        duration_ms: u64,
    },
}

/// Result of a cache evict operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The key did not exist.
    Absent,
    Deleted { size: u64 },
}
