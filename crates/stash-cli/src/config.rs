//! Resolved run configuration.

use crate::commands::{CacheArgs, Codec, Verb};
use stash_cache::compression::validate_level;
use stash_cache::{S3Options, TransferConfig, cache_key};
use stash_core::{CompressionMode, Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

const MB: u64 = 1000 * 1000;
const MIB: u64 = 1024 * 1024;
const GB: u64 = 1000 * MB;
const GIB: u64 = 1024 * MIB;

/// Where cache objects live.
#[derive(Debug, Clone)]
pub enum Backend {
    S3(S3Options),
    Filesystem(PathBuf),
}

/// Everything one invocation needs, validated up front.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub verb: Verb,
    /// Stored key, extension included.
    pub key: String,
    pub default_key: Option<String>,
    pub patterns: Vec<String>,
    pub compression: CompressionMode,
    pub storage_class: Option<String>,
    pub transfer: TransferConfig,
    pub backend: Backend,
    pub buffered: bool,
    /// Patterns are resolved against this directory.
    pub working_dir: PathBuf,
    pub restore_dir: PathBuf,
}

impl CacheConfig {
    pub fn from_args(args: &CacheArgs, working_dir: &Path) -> Result<Self> {
        let base_key = non_empty(args.key.as_deref())
            .ok_or_else(|| Error::Configuration("KEY is required".into()))?;

        let level = match parse_count("COMPRESSION_LEVEL", args.compression_level.as_deref()) {
            Some(level) if level > 0 => {
                let level = i32::try_from(level).map_err(|_| {
                    Error::Configuration(format!("Compression level {} is out of range", level))
                })?;
                validate_level(level)?;
                Some(level)
            }
            _ => None,
        };
        let compression = match args.compression {
            Codec::Zstd => CompressionMode::Zstd { level },
            Codec::None => CompressionMode::None,
        };

        let patterns = split_patterns(args.artifacts.as_deref());
        if args.action == Verb::Save && patterns.is_empty() {
            return Err(Error::Configuration(
                "ARTIFACTS must list at least one pattern to save".into(),
            ));
        }

        let backend = match (&args.store_dir, non_empty(args.bucket.as_deref())) {
            (Some(dir), _) => Backend::Filesystem(dir.clone()),
            (None, Some(bucket)) => Backend::S3(S3Options {
                bucket: bucket.to_string(),
                region: non_empty(args.region.as_deref()).map(str::to_string),
                endpoint: non_empty(args.endpoint.as_deref()).map(str::to_string),
                accelerate: is_enabled(args.accelerate.as_deref()),
            }),
            (None, None) => {
                return Err(Error::Configuration(
                    "BUCKET (or STORE_DIR) is required".into(),
                ));
            }
        };

        let transfer = TransferConfig {
            upload_concurrency: parse_count(
                "UPLOAD_CONCURRENCY",
                args.upload_concurrency.as_deref(),
            ),
            download_concurrency: parse_count(
                "DOWNLOAD_CONCURRENCY",
                args.download_concurrency.as_deref(),
            ),
            upload_part_size: parse_byte_size("UPLOAD_PART_SIZE", args.upload_part_size.as_deref()),
            download_part_size: parse_byte_size(
                "DOWNLOAD_PART_SIZE",
                args.download_part_size.as_deref(),
            ),
        };

        Ok(Self {
            verb: args.action,
            key: cache_key(base_key, compression),
            default_key: non_empty(args.default_key.as_deref()).map(str::to_string),
            patterns,
            compression,
            storage_class: non_empty(args.storage_class.as_deref()).map(str::to_string),
            transfer,
            backend,
            buffered: is_enabled(args.buffered_upload.as_deref()),
            working_dir: working_dir.to_path_buf(),
            restore_dir: args
                .restore_dir
                .clone()
                .unwrap_or_else(|| working_dir.to_path_buf()),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_enabled(value: Option<&str>) -> bool {
    non_empty(value).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Artifact patterns, one per line. Blank lines are dropped.
pub fn split_patterns(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lenient integer: empty is unset, garbage warns and is unset.
pub fn parse_count(name: &str, raw: Option<&str>) -> Option<usize> {
    let value = non_empty(raw)?;
    match value.parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(var = name, value, "invalid integer, using default");
            None
        }
    }
}

/// Lenient byte size: a plain byte count or a number with a `MB`, `MiB`,
/// `GB` or `GiB` suffix (any case).
pub fn parse_byte_size(name: &str, raw: Option<&str>) -> Option<u64> {
    let value = non_empty(raw)?;
    let upper = value.to_ascii_uppercase();
    let (digits, multiplier) = [("GIB", GIB), ("GB", GB), ("MIB", MIB), ("MB", MB)]
        .into_iter()
        .find(|(suffix, _)| upper.ends_with(suffix))
        .map(|(suffix, multiplier)| (value[..value.len() - suffix.len()].trim(), multiplier))
        .unwrap_or((value, 1));

    match digits.parse::<u64>().ok().and_then(|n| n.checked_mul(multiplier)) {
        Some(bytes) => Some(bytes),
        None => {
            warn!(var = name, value, "invalid byte size, using default");
            None
        }
    }
}
