//! Verb handlers.

use crate::config::CacheConfig;
use stash_cache::{
    CacheResolver, CacheRestoreRequest, CacheSaveRequest, EvictOutcome, RestoreOutcome,
    SaveOutcome,
};
use stash_core::Result;
use tracing::{info, warn};

/// Save artifacts under the configured key.
pub async fn save(resolver: &CacheResolver, config: &CacheConfig) -> Result<()> {
    info!(key = %config.key, compression = %config.compression, buffered = config.buffered, "saving cache");
    let request = CacheSaveRequest {
        key: config.key.clone(),
        patterns: config.patterns.clone(),
        base_dir: config.working_dir.clone(),
        storage_class: config.storage_class.clone(),
        compression: config.compression,
        transfer: config.transfer,
        buffered: config.buffered,
    };

    match resolver.save(&request).await? {
        SaveOutcome::Hit => info!(key = %config.key, "cache hit, skipping upload"),
        SaveOutcome::Uploaded {
            bytes,
            files,
            duration_ms,
        } => info!(
            key = %config.key,
            files,
            size = %readable_bytes(bytes),
            duration_ms,
            speed = %throughput(bytes, duration_ms),
            "cache saved"
        ),
    }
    Ok(())
}

/// Restore the configured key, or the latest entry under the default key.
pub async fn restore(resolver: &CacheResolver, config: &CacheConfig) -> Result<()> {
    info!(key = %config.key, default_key = ?config.default_key, "restoring cache");
    let request = CacheRestoreRequest {
        key: config.key.clone(),
        default_key: config.default_key.clone(),
        compression: config.compression,
        transfer: config.transfer,
        destination: config.restore_dir.clone(),
    };

    match resolver.restore(&request).await? {
        RestoreOutcome::Miss => warn!(key = %config.key, "no cache found, skipping restore"),
        RestoreOutcome::Restored {
            matched_key,
            exact_match,
            bytes,
            files,
            duration_ms,
        } => {
            if !exact_match {
                info!(key = %matched_key, "restored latest entry under default key");
            }
            info!(
                key = %matched_key,
                files,
                size = %readable_bytes(bytes),
                duration_ms,
                speed = %throughput(bytes, duration_ms),
                "cache restored"
            );
        }
    }
    Ok(())
}

/// Delete the configured key.
pub async fn evict(resolver: &CacheResolver, config: &CacheConfig) -> Result<()> {
    match resolver.evict(&config.key).await? {
        EvictOutcome::Absent => info!(key = %config.key, "cache entry already absent"),
        EvictOutcome::Deleted { size } => {
            info!(key = %config.key, size = %readable_bytes(size), "cache entry deleted")
        }
    }
    Ok(())
}

/// Byte count in decimal units: `999 B`, `1.5 kB`, `2.0 MB`.
pub fn readable_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}

fn throughput(bytes: u64, duration_ms: u64) -> String {
    let seconds = duration_ms.max(1) as f64 / 1000.0;
    format!("{:.1} MiB/s", bytes as f64 / (1024.0 * 1024.0) / seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_bytes() {
        assert_eq!(readable_bytes(0), "0 B");
        assert_eq!(readable_bytes(500), "500 B");
        assert_eq!(readable_bytes(1500), "1.5 kB");
        assert_eq!(readable_bytes(1_500_000), "1.5 MB");
        assert_eq!(readable_bytes(1_500_000_000), "1.5 GB");
        assert_eq!(readable_bytes(u64::MAX), "18.4 EB");
    }

    #[test]
    fn test_throughput() {
        assert_eq!(throughput(10 * 1024 * 1024, 2000), "5.0 MiB/s");
        assert_eq!(throughput(0, 0), "0.0 MiB/s");
    }
}
