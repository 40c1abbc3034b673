//! Cache types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the tar framing of an archive is wrapped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CompressionMode {
    /// The archive bytes are the raw tar framing.
    None,
    /// Tar framing wrapped in a zstd frame. `None` uses the compressor default.
    Zstd { level: Option<i32> },
}

impl CompressionMode {
    pub const fn zstd() -> Self {
        CompressionMode::Zstd { level: None }
    }

    /// File extension appended to cache keys written in this mode.
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionMode::None => ".tar",
            CompressionMode::Zstd { .. } => ".tar.zst",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionMode::None => "none",
            CompressionMode::Zstd { .. } => "zstd",
        }
    }
}

impl Default for CompressionMode {
    fn default() -> Self {
        Self::zstd()
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMode::Zstd { level: Some(level) } => write!(f, "zstd(level={})", level),
            other => f.write_str(other.name()),
        }
    }
}

/// Properties a store reports for a single object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One row of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}
