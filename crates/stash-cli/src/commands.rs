//! CLI argument definitions.
//!
//! Every option can also be supplied through the environment, which is how
//! CI runners drive the binary.

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Cache verb to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verb {
    /// Archive artifacts and upload them unless the key exists
    #[value(alias = "put")]
    Save,

    /// Download and extract a cache entry
    #[value(alias = "get")]
    Restore,

    /// Delete a cache entry
    #[value(alias = "delete")]
    Evict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Codec {
    #[default]
    Zstd,
    None,
}

#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    /// Verb to run
    #[arg(long, env = "ACTION", value_enum)]
    pub action: Verb,

    /// Bucket holding cache objects
    #[arg(long, env = "BUCKET")]
    pub bucket: Option<String>,

    /// Cache key, without extension
    #[arg(long, env = "KEY")]
    pub key: Option<String>,

    /// Prefix searched for the latest entry when the key misses
    #[arg(long, env = "DEFAULT_KEY")]
    pub default_key: Option<String>,

    /// Newline-separated glob patterns to archive
    #[arg(long, env = "ARTIFACTS")]
    pub artifacts: Option<String>,

    /// Storage class for uploaded objects
    #[arg(long = "s3-class", env = "S3_CLASS")]
    pub storage_class: Option<String>,

    #[arg(long, env = "COMPRESSION", value_enum, default_value_t = Codec::Zstd)]
    pub compression: Codec,

    /// zstd level; 0 or empty uses the default
    #[arg(long, env = "COMPRESSION_LEVEL")]
    pub compression_level: Option<String>,

    /// Parallel upload parts
    #[arg(long, env = "UPLOAD_CONCURRENCY")]
    pub upload_concurrency: Option<String>,

    /// Parallel download parts
    #[arg(long, env = "DOWNLOAD_CONCURRENCY")]
    pub download_concurrency: Option<String>,

    /// Upload part size (bytes, or with a MB/MiB/GB/GiB suffix)
    #[arg(long, env = "UPLOAD_PART_SIZE")]
    pub upload_part_size: Option<String>,

    /// Download part size (bytes, or with a MB/MiB/GB/GiB suffix)
    #[arg(long, env = "DOWNLOAD_PART_SIZE")]
    pub download_part_size: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint
    #[arg(long, env = "AWS_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Use S3 Transfer Acceleration ("true" to enable)
    #[arg(long, env = "S3_USE_ACCELERATE")]
    pub accelerate: Option<String>,

    /// Keep cache objects in this directory instead of S3
    #[arg(long, env = "STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Archive to a temporary file before uploading ("true" to enable)
    #[arg(long, env = "BUFFERED_UPLOAD")]
    pub buffered_upload: Option<String>,

    /// Directory restored archives are extracted into
    #[arg(long, env = "RESTORE_DIR")]
    pub restore_dir: Option<PathBuf>,
}
