//! Parallel chunked transfers against an [`ObjectStore`].
//!
//! Uploads split a byte source into sequential parts and keep up to the
//! resolved concurrency of them in flight; downloads fetch part-aligned byte
//! ranges concurrently and write each one at its own offset.

use crate::store::{CompletedPart, ObjectStore};
use crate::types::TransferConfig;
use stash_core::{Error, Result};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

pub const MIB: u64 = 1024 * 1024;

/// Smallest part the store accepts (the final part excepted).
pub const MIN_PART_SIZE: u64 = 5 * MIB;

/// Largest part this engine will use.
pub const MAX_PART_SIZE: u64 = 100 * MIB;

/// Most parts a single multipart upload may have.
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Part size for a transfer.
///
/// A positive override is clamped into `[MIN_PART_SIZE, MAX_PART_SIZE]`.
/// Without one, an upload of known size uses the smallest whole-MiB part
/// that keeps the part count within [`MAX_UPLOAD_PARTS`]; streams of unknown
/// size and downloads use [`MIN_PART_SIZE`].
pub fn resolve_part_size(
    total_size: Option<u64>,
    override_size: Option<u64>,
    direction: TransferDirection,
) -> u64 {
    if let Some(size) = override_size.filter(|s| *s > 0) {
        return size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
    }

    match (direction, total_size) {
        (TransferDirection::Upload, Some(total)) => {
            let part = total
                .div_ceil(MAX_UPLOAD_PARTS)
                .clamp(MIN_PART_SIZE, MAX_PART_SIZE);
            part.div_ceil(MIB) * MIB
        }
        _ => MIN_PART_SIZE,
    }
}

pub fn resolve_concurrency(override_concurrency: Option<usize>) -> usize {
    override_concurrency
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_CONCURRENCY)
}

/// Drives part transfers for one store.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload everything `source` yields to `key`, returning the byte count.
    ///
    /// `total_size` is the source length when known up front. Either the
    /// whole object becomes visible or, on any failure, the multipart upload
    /// is aborted and nothing is.
    pub async fn upload<R>(
        &self,
        source: &mut R,
        key: &str,
        storage_class: Option<&str>,
        total_size: Option<u64>,
        config: &TransferConfig,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let part_size = resolve_part_size(
            total_size,
            config.upload_part_size,
            TransferDirection::Upload,
        );
        let concurrency = resolve_concurrency(config.upload_concurrency);
        debug!(key, part_size, concurrency, ?total_size, "starting upload");

        let first = read_part(source, part_size).await?;
        if (first.len() as u64) < part_size {
            let len = first.len() as u64;
            self.store.put(key, first, storage_class).await?;
            return Ok(len);
        }

        let upload_id = self.store.create_multipart(key, storage_class).await?;
        let uploaded = self
            .upload_parts(source, key, &upload_id, first, part_size, concurrency)
            .await;

        let result = match uploaded {
            Ok((parts, bytes)) => self
                .store
                .complete_multipart(key, &upload_id, &parts)
                .await
                .map(|_| bytes),
            Err(err) => Err(err),
        };

        if result.is_err() {
            if let Err(abort_err) = self.store.abort_multipart(key, &upload_id).await {
                warn!(key, upload_id = %upload_id, error = %abort_err, "failed to abort multipart upload");
            }
        }
        result
    }

    /// Upload the file at `path` with its size known up front.
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        storage_class: Option<&str>,
        config: &TransferConfig,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.upload(&mut file, key, storage_class, Some(size), config)
            .await
    }

    async fn upload_parts<R>(
        &self,
        source: &mut R,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        part_size: u64,
        concurrency: usize,
    ) -> Result<(Vec<CompletedPart>, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut in_flight = JoinSet::new();
        let mut completed = Vec::new();
        let mut total = 0u64;
        let mut part_number: i32 = 0;
        let mut next = Some(first);

        while let Some(body) = next.take() {
            part_number += 1;
            if part_number as u64 > MAX_UPLOAD_PARTS {
                return Err(Error::Transfer(format!(
                    "{} exceeds {} parts of {} bytes",
                    key, MAX_UPLOAD_PARTS, part_size
                )));
            }

            let is_last = (body.len() as u64) < part_size;
            total += body.len() as u64;

            let store = Arc::clone(&self.store);
            let part_key = key.to_string();
            let part_upload = upload_id.to_string();
            in_flight.spawn(async move {
                store
                    .upload_part(&part_key, &part_upload, part_number, body)
                    .await
            });

            while let Some(joined) = in_flight.try_join_next() {
                completed.push(joined_part(joined)?);
            }
            while in_flight.len() >= concurrency {
                if let Some(joined) = in_flight.join_next().await {
                    completed.push(joined_part(joined)?);
                }
            }

            if !is_last {
                let body = read_part(source, part_size).await?;
                if !body.is_empty() {
                    next = Some(body);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            completed.push(joined_part(joined)?);
        }

        completed.sort_by_key(|part| part.part_number);
        Ok((completed, total))
    }

    /// Download `key` into `destination`, returning the byte count.
    ///
    /// On failure the destination file is removed.
    pub async fn download(
        &self,
        key: &str,
        destination: &Path,
        config: &TransferConfig,
    ) -> Result<u64> {
        let size = self
            .store
            .head(key)
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))?
            .size;
        let part_size = resolve_part_size(
            Some(size),
            config.download_part_size,
            TransferDirection::Download,
        );
        let concurrency = resolve_concurrency(config.download_concurrency);
        debug!(key, size, part_size, concurrency, "starting download");

        let result = self
            .download_ranges(key, destination, size, part_size, concurrency)
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(destination).await;
        }
        result
    }

    async fn download_ranges(
        &self,
        key: &str,
        destination: &Path,
        size: u64,
        part_size: u64,
        concurrency: usize,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(destination).await?;
        file.set_len(size).await?;

        let mut ranges = (0..size).step_by(part_size as usize).map(|start| {
            let end = (start + part_size).min(size) - 1;
            (start, end)
        });
        let mut in_flight = JoinSet::new();
        let mut written = 0u64;

        loop {
            while in_flight.len() < concurrency {
                let Some((start, end)) = ranges.next() else {
                    break;
                };
                let store = Arc::clone(&self.store);
                let range_key = key.to_string();
                in_flight.spawn(async move {
                    let body = store.get_range(&range_key, start, end).await?;
                    Ok::<_, Error>((start, end, body))
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (start, end, body) = joined.map_err(join_failure)??;
            if body.len() as u64 != end - start + 1 {
                return Err(Error::Transfer(format!(
                    "Short read of {} at bytes {}-{}: got {}",
                    key,
                    start,
                    end,
                    body.len()
                )));
            }

            file.seek(SeekFrom::Start(start)).await?;
            file.write_all(&body).await?;
            written += body.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Fill a buffer of up to `part_size` bytes; shorter only at end of input.
async fn read_part<R>(source: &mut R, part_size: u64) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::with_capacity(part_size as usize);
    (&mut *source).take(part_size).read_to_end(&mut body).await?;
    Ok(body)
}

fn joined_part(
    joined: std::result::Result<Result<CompletedPart>, JoinError>,
) -> Result<CompletedPart> {
    joined.map_err(join_failure)?
}

fn join_failure(err: JoinError) -> Error {
    Error::Internal(format!("Transfer task failed: {}", err))
}
