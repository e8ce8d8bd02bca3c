//! S3-compatible object storage backend.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, GCS interop, etc.)
//! using the same content-addressable key layout as the filesystem backend.
//! Object stores have no directories, so whole-asset deletion lists the asset
//! prefix and removes every object under it.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use crate::error::StorageError;

use super::layout;
use super::BlobStore;

/// Blob storage in an S3 bucket.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a store for the given bucket.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The configured bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let key = layout::blob_path(fingerprint, variant_key, is_origin);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put s3://{}/{}: {}", self.bucket, key, e)))?;

        debug!(bucket = %self.bucket, key = %key, size = data.len(), "stored blob");
        Ok(())
    }

    async fn get(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
    ) -> Result<Bytes, StorageError> {
        let key = layout::blob_path(fingerprint, variant_key, is_origin);
        let location = format!("s3://{}/{}", self.bucket, key);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if is_missing {
                    StorageError::NotFound(location.clone())
                } else {
                    StorageError::Backend(format!("get {}: {}", location, e))
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("get {}: {}", location, e)))?
            .into_bytes();

        debug!(bucket = %self.bucket, key = %key, size = data.len(), "read blob");
        Ok(data)
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), StorageError> {
        // List every object under the asset prefix, then delete them all.
        let prefix = format!("{}/", layout::asset_dir(fingerprint));
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .max_keys(1000);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let result = request.send().await.map_err(|e| {
                StorageError::Backend(format!("list s3://{}/{}: {}", self.bucket, prefix, e))
            })?;

            for obj in result.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if result.is_truncated() == Some(true) {
                continuation_token = result.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        if keys.is_empty() {
            return Err(StorageError::NotFound(format!(
                "s3://{}/{}",
                self.bucket, prefix
            )));
        }

        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Backend(format!("delete s3://{}/{}: {}", self.bucket, key, e))
                })?;
        }

        debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "deleted asset");
        Ok(())
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// S3-compatible services behind a custom endpoint get path-style addressing,
/// which most of them require.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
