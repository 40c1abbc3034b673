//! S3 (and S3-compatible) object store.

use crate::store::{CompletedPart, ObjectStore};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, StorageClass};
use chrono::{DateTime, Utc};
use stash_core::{Error, ObjectMetadata, ObjectSummary, Result};
use tracing::debug;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    /// Falls back to [`DEFAULT_REGION`].
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack);
    /// implies path-style addressing.
    pub endpoint: Option<String>,
    /// Use S3 Transfer Acceleration. Ignored when `endpoint` is set.
    pub accelerate: bool,
}

/// Object store backed by one S3 bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the default AWS credential chain.
    pub async fn connect(options: S3Options) -> Self {
        let region = options
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &options.endpoint {
            debug!(endpoint = %endpoint, "using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        } else if options.accelerate {
            debug!("S3 transfer acceleration enabled");
            builder = builder.accelerate(true);
        }

        Self::from_client(Client::from_conf(builder.build()), options.bucket)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

fn s3_error<E>(operation: &str, key: &str, err: E) -> Error
where
    E: std::error::Error + 'static,
{
    Error::Transfer(format!(
        "S3 {} of {} failed: {}",
        operation,
        key,
        DisplayErrorContext(err)
    ))
}

fn to_chrono(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn to_size(length: Option<i64>) -> u64 {
    length.unwrap_or(0).max(0) as u64
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match response {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: to_size(output.content_length()),
                last_modified: output.last_modified().and_then(to_chrono),
            })),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(None),
            Err(err) => Err(s3_error("head", key, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| s3_error("list", prefix, e))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: to_size(object.size()),
                    last_modified: object.last_modified().and_then(to_chrono),
                });
            }
        }
        Ok(objects)
    }

    async fn put(&self, key: &str, body: Vec<u8>, storage_class: Option<&str>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_storage_class(storage_class.map(StorageClass::from))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error("put", key, e))?;
        Ok(())
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, end))
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                return Err(Error::NotFound(key.to_string()));
            }
            Err(err) => return Err(s3_error("get", key, err)),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| s3_error("read", key, e))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("delete", key, e))?;
        Ok(())
    }

    async fn create_multipart(&self, key: &str, storage_class: Option<&str>) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_storage_class(storage_class.map(StorageClass::from))
            .send()
            .await
            .map_err(|e| s3_error("create multipart upload", key, e))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Transfer(format!("S3 returned no upload id for {}", key)))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error(&format!("upload part {}", part_number), key, e))?;

        let e_tag = output.e_tag().ok_or_else(|| {
            Error::Transfer(format!("S3 returned no ETag for part {} of {}", part_number, key))
        })?;
        Ok(CompletedPart {
            part_number,
            e_tag: e_tag.to_string(),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let parts = parts
            .iter()
            .map(|part| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.e_tag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| s3_error("complete multipart upload", key, e))?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| s3_error("abort multipart upload", key, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_chrono() {
        let time = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&time).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_to_size_ignores_negative_lengths() {
        assert_eq!(to_size(Some(42)), 42);
        assert_eq!(to_size(Some(-1)), 0);
        assert_eq!(to_size(None), 0);
    }
}
