//! Save, restore and evict verbs over an object store.
//!
//! Each call is self-contained: the resolver keeps no state between calls
//! beyond the store handle it was built with.

use crate::archiver::{self, ArchiveSpec};
use crate::keys::compression_from_key;
use crate::store::ObjectStore;
use crate::stream::ArchiveStream;
use crate::transfer::TransferEngine;
use crate::types::{
    CacheRestoreRequest, CacheSaveRequest, EvictOutcome, RestoreOutcome, SaveOutcome,
};
use stash_core::{Error, ObjectSummary, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::debug;

pub struct CacheResolver {
    engine: TransferEngine,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            engine: TransferEngine::new(store),
        }
    }

    fn store(&self) -> &Arc<dyn ObjectStore> {
        self.engine.store()
    }

    /// Archive the request's patterns and upload them under its key.
    ///
    /// An existing key is a hit and nothing is transferred: entries are
    /// never overwritten.
    pub async fn save(&self, request: &CacheSaveRequest) -> Result<SaveOutcome> {
        let start = Instant::now();
        if self.store().exists(&request.key).await? {
            debug!(key = %request.key, "key already present");
            return Ok(SaveOutcome::Hit);
        }

        let spec = ArchiveSpec::new(request.patterns.clone(), &request.base_dir);
        let (bytes, files) = if request.buffered {
            self.save_buffered(request, spec).await?
        } else {
            self.save_streaming(request, spec).await?
        };

        Ok(SaveOutcome::Uploaded {
            bytes,
            files,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn save_streaming(
        &self,
        request: &CacheSaveRequest,
        spec: ArchiveSpec,
    ) -> Result<(u64, u64)> {
        let mut stream = ArchiveStream::spawn(spec, request.compression);
        let uploaded = self
            .engine
            .upload(
                &mut stream,
                &request.key,
                request.storage_class.as_deref(),
                None,
                &request.transfer,
            )
            .await;
        let encoded = stream.finish().await;

        // The encoder's own failure explains an upload that failed reading
        // from it; an encoder cut short by a failed upload does not.
        match (encoded, uploaded) {
            (Ok(summary), Ok(bytes)) => Ok((bytes, summary.files)),
            (Err(err), _) if !err.is_secondary() => Err(err),
            (_, Err(err)) => Err(err),
            (Err(err), Ok(_)) => Err(err),
        }
    }

    async fn save_buffered(
        &self,
        request: &CacheSaveRequest,
        spec: ArchiveSpec,
    ) -> Result<(u64, u64)> {
        let staging = tempfile::Builder::new()
            .prefix("stash-")
            .suffix(request.compression.extension())
            .tempfile()?;
        let path = staging.path().to_path_buf();
        let compression = request.compression;

        let summary =
            tokio::task::spawn_blocking(move || archiver::encode_to_file(&path, &spec, compression))
                .await
                .map_err(join_failure)??;
        let bytes = self
            .engine
            .upload_file(
                staging.path(),
                &request.key,
                request.storage_class.as_deref(),
                &request.transfer,
            )
            .await?;

        Ok((bytes, summary.files))
    }

    /// Download and extract the request's key, falling back to the most
    /// recent object under the default prefix. Finding neither is a miss,
    /// not an error, and leaves the filesystem untouched.
    pub async fn restore(&self, request: &CacheRestoreRequest) -> Result<RestoreOutcome> {
        let start = Instant::now();
        let (matched_key, exact_match) = if self.store().exists(&request.key).await? {
            (request.key.clone(), true)
        } else {
            match self.latest_under(request.default_key.as_deref()).await? {
                Some(key) => (key, false),
                None => return Ok(RestoreOutcome::Miss),
            }
        };
        debug!(key = %matched_key, exact_match, "restoring");

        let compression = compression_from_key(&matched_key).unwrap_or(request.compression);
        let staging = tempfile::Builder::new().prefix("stash-").tempfile()?;
        let bytes = match self
            .engine
            .download(&matched_key, staging.path(), &request.transfer)
            .await
        {
            Ok(bytes) => bytes,
            // Evicted between the lookup and the download.
            Err(err) if err.is_not_found() => return Ok(RestoreOutcome::Miss),
            Err(err) => return Err(err),
        };

        let path = staging.path().to_path_buf();
        let destination = request.destination.clone();
        let files = tokio::task::spawn_blocking(move || {
            archiver::decode_file(&path, &destination, compression)
        })
        .await
        .map_err(join_failure)??;

        Ok(RestoreOutcome::Restored {
            matched_key,
            exact_match,
            bytes,
            files,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn latest_under(&self, prefix: Option<&str>) -> Result<Option<String>> {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let objects = self.store().list(prefix).await?;
        Ok(select_latest(objects).map(|object| object.key))
    }

    /// Delete `key`, reporting the reclaimed size. A missing key is already
    /// evicted.
    pub async fn evict(&self, key: &str) -> Result<EvictOutcome> {
        match self.store().head(key).await? {
            None => Ok(EvictOutcome::Absent),
            Some(metadata) => {
                self.store().delete(key).await?;
                Ok(EvictOutcome::Deleted {
                    size: metadata.size,
                })
            }
        }
    }
}

/// The most recently modified object; ties go to the greatest key, and
/// objects without a timestamp rank oldest.
pub fn select_latest(objects: Vec<ObjectSummary>) -> Option<ObjectSummary> {
    objects.into_iter().max_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    })
}

fn join_failure(err: JoinError) -> Error {
    Error::Internal(format!("Archive task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn object(key: &str, secs: Option<i64>) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size: 1,
            last_modified: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn test_select_latest_by_time() {
        let latest = select_latest(vec![
            object("cache-a.tar.zst", Some(100)),
            object("cache-b.tar.zst", Some(300)),
            object("cache-c.tar.zst", Some(200)),
        ]);
        assert_eq!(latest.unwrap().key, "cache-b.tar.zst");
    }

    #[test]
    fn test_select_latest_ties_and_missing_times() {
        let latest = select_latest(vec![
            object("cache-z.tar", None),
            object("cache-a.tar", Some(100)),
            object("cache-b.tar", Some(100)),
        ]);
        assert_eq!(latest.unwrap().key, "cache-b.tar");
        assert!(select_latest(vec![]).is_none());
    }
}
