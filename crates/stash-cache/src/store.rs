//! Object store trait and the filesystem implementation.

use crate::keys::{matches_prefix, sanitize_key};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_core::{Error, ObjectMetadata, ObjectSummary, Result};
use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// One part of a multipart upload accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// Trait for object storage backends.
///
/// Multipart uploads become visible under their key only once
/// [`complete_multipart`](ObjectStore::complete_multipart) succeeds; an
/// aborted upload leaves nothing behind.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Properties of `key`, or `None` when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// List objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>>;

    /// Write a whole object in one request.
    async fn put(&self, key: &str, body: Vec<u8>, storage_class: Option<&str>) -> Result<()>;

    /// Read the inclusive byte range `start..=end` of `key`.
    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Begin a multipart upload, returning its upload id.
    async fn create_multipart(&self, key: &str, storage_class: Option<&str>) -> Result<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedPart>;

    /// Assemble `parts`, which must be sorted by part number.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;
}

const STAGING_DIR: &str = ".uploads";

/// Filesystem-based store for local runs and tests.
pub struct FilesystemStore {
    root_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root_dir.join(sanitize_key(key))
    }

    fn staging_path(&self, upload_id: &str) -> PathBuf {
        self.root_dir.join(STAGING_DIR).join(upload_id)
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root_dir.join(STAGING_DIR))
            .await
            .map_err(|e| Error::Transfer(format!("Failed to create store dir: {}", e)))
    }
}

fn modified_at(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        match tokio::fs::metadata(self.key_path(key)).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectMetadata {
                size: metadata.len(),
                last_modified: modified_at(&metadata),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Transfer(format!("Failed to stat {}: {}", key, e))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        if !self.root_dir.exists() {
            return Ok(vec![]);
        }

        let sanitized_prefix = sanitize_key(prefix);
        let mut entries = vec![];
        let mut read_dir = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to read store dir: {}", e)))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::Transfer(format!("Failed to read entry: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !matches_prefix(&name, &sanitized_prefix) {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| Error::Transfer(format!("Failed to read metadata: {}", e)))?;
            if !metadata.is_file() {
                continue;
            }

            entries.push(ObjectSummary {
                key: name,
                size: metadata.len(),
                last_modified: modified_at(&metadata),
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn put(&self, key: &str, body: Vec<u8>, _storage_class: Option<&str>) -> Result<()> {
        self.ensure_root().await?;
        let staged = self
            .root_dir
            .join(STAGING_DIR)
            .join(format!("put-{}", uuid::Uuid::new_v4()));

        tokio::fs::write(&staged, &body)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to write {}: {}", key, e)))?;
        tokio::fs::rename(&staged, self.key_path(key))
            .await
            .map_err(|e| Error::Transfer(format!("Failed to publish {}: {}", key, e)))
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut file = match tokio::fs::File::open(self.key_path(key)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(key.to_string()));
            }
            Err(e) => return Err(Error::Transfer(format!("Failed to open {}: {}", key, e))),
        };

        let mut body = Vec::with_capacity((end - start + 1) as usize);
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| Error::Transfer(format!("Failed to seek {}: {}", key, e)))?;
        file.take(end - start + 1)
            .read_to_end(&mut body)
            .await
            .map_err(|e| Error::Transfer(format!("Failed to read {}: {}", key, e)))?;
        Ok(body)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Transfer(format!("Failed to delete {}: {}", key, e))),
        }
    }

    async fn create_multipart(&self, key: &str, _storage_class: Option<&str>) -> Result<String> {
        self.ensure_root().await?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        tokio::fs::create_dir(self.staging_path(&upload_id))
            .await
            .map_err(|e| Error::Transfer(format!("Failed to start upload of {}: {}", key, e)))?;
        debug!(key, upload_id = %upload_id, "started multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedPart> {
        let staging = self.staging_path(upload_id);
        if !staging.is_dir() {
            return Err(Error::Transfer(format!(
                "No such upload {} for {}",
                upload_id, key
            )));
        }

        let e_tag = format!("{:05}", part_number);
        tokio::fs::write(staging.join(&e_tag), &body)
            .await
            .map_err(|e| {
                Error::Transfer(format!("Failed to write part {} of {}: {}", part_number, key, e))
            })?;

        Ok(CompletedPart { part_number, e_tag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let staging = self.staging_path(upload_id);
        let assembled_path = staging.join("assembled");
        let assemble_err = |e: std::io::Error| {
            Error::Transfer(format!("Failed to assemble {}: {}", key, e))
        };

        let mut assembled = tokio::fs::File::create(&assembled_path)
            .await
            .map_err(assemble_err)?;
        for part in parts {
            let mut part_file = tokio::fs::File::open(staging.join(&part.e_tag))
                .await
                .map_err(assemble_err)?;
            tokio::io::copy(&mut part_file, &mut assembled)
                .await
                .map_err(assemble_err)?;
        }
        assembled.flush().await.map_err(assemble_err)?;
        drop(assembled);

        tokio::fs::rename(&assembled_path, self.key_path(key))
            .await
            .map_err(assemble_err)?;
        tokio::fs::remove_dir_all(&staging)
            .await
            .map_err(assemble_err)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.staging_path(upload_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Transfer(format!("Failed to abort upload of {}: {}", key, e))),
        }
    }
}
