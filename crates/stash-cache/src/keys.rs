//! Cache key conventions.

use stash_core::CompressionMode;

/// Build the stored object key for a logical key written in `mode`.
pub fn cache_key(base: &str, mode: CompressionMode) -> String {
    format!("{}{}", base, mode.extension())
}

/// Infer the compression of a stored object from its key extension.
pub fn compression_from_key(key: &str) -> Option<CompressionMode> {
    if key.ends_with(".tar.zst") {
        Some(CompressionMode::zstd())
    } else if key.ends_with(".tar") {
        Some(CompressionMode::None)
    } else {
        None
    }
}

/// Whether a stored key falls under a default-key prefix. The empty prefix
/// covers every key, as in an S3 listing.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix)
}

/// Characters a key may contain that cannot appear in a single file name.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Map a stored key to a flat file name for the filesystem store.
pub fn sanitize_key(key: &str) -> String {
    key.replace(RESERVED, "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("cargo-abc", CompressionMode::None), "cargo-abc.tar");
        assert_eq!(
            cache_key("cargo-abc", CompressionMode::zstd()),
            "cargo-abc.tar.zst"
        );
    }

    #[test]
    fn test_compression_from_key() {
        assert_eq!(
            compression_from_key("main/cargo.tar.zst"),
            Some(CompressionMode::zstd())
        );
        assert_eq!(compression_from_key("cargo.tar"), Some(CompressionMode::None));
        assert_eq!(compression_from_key("cargo.tar.gz"), None);
    }

    #[test]
    fn test_default_key_prefix_matching() {
        assert!(matches_prefix("cargo-linux-9f2c.tar.zst", "cargo-linux-"));
        assert!(matches_prefix("cargo-linux-9f2c.tar", "cargo-"));
        assert!(matches_prefix("cargo-linux-9f2c.tar.zst", ""));
        assert!(!matches_prefix("npm-linux-9f2c.tar.zst", "cargo-"));
    }

    #[test]
    fn test_sanitize_branch_scoped_keys() {
        assert_eq!(
            sanitize_key("main/cargo-linux.tar.zst"),
            "main_cargo-linux.tar.zst"
        );
        assert_eq!(
            sanitize_key("refs\\pr:12/deps?.tar"),
            "refs_pr_12_deps_.tar"
        );
        assert_eq!(sanitize_key("cargo-abc.tar.zst"), "cargo-abc.tar.zst");
    }
}
