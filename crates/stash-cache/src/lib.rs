//! CI cache artifacts for stash (S3 compatible).
//!
//! Packs file-tree patterns into a streamed tar archive, moves it to and from
//! an object store with parallel part transfers, and resolves cache keys with
//! a most-recent-under-prefix fallback.

pub mod archiver;
pub mod compression;
pub mod keys;
pub mod resolver;
pub mod s3;
pub mod store;
pub mod stream;
pub mod transfer;
pub mod types;

pub use archiver::{ArchiveSpec, EncodeSummary};
pub use keys::{cache_key, compression_from_key, matches_prefix, sanitize_key};
pub use resolver::CacheResolver;
pub use s3::{S3Options, S3Store};
pub use store::{CompletedPart, FilesystemStore, ObjectStore};
pub use stream::ArchiveStream;
pub use transfer::{TransferDirection, TransferEngine, resolve_concurrency, resolve_part_size};
pub use types::{
    CacheRestoreRequest, CacheSaveRequest, EvictOutcome, RestoreOutcome, SaveOutcome,
    TransferConfig,
};
