use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

/// User metadata attached to stored objects (`x-amz-meta-*`).
pub type ObjectMetadata = HashMap<String, String>;

/// Result of a HEAD request against an object.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub content_length: Option<u64>,
    pub metadata: ObjectMetadata,
}

/// Byte-buffer contract over object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Returns `None` when the object does not exist.
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, StorageError>;

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.head(bucket, key).await?.is_some())
    }
}

/// S3-compatible object storage (R2, MinIO, AWS).
pub struct S3ObjectStore {
    region: Region,
    credentials: Credentials,
}

impl S3ObjectStore {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(bucket.with_path_style())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .await
            .map_err(|e| StorageError::from_s3(e, bucket, key))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::from_status(
                status,
                response.as_slice(),
                bucket,
                key,
            ));
        }
        Ok(Bytes::from(response.to_vec()))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        let mut handle = self.bucket(bucket)?;
        for (name, value) in metadata {
            handle.add_header(&format!("x-amz-meta-{name}"), value);
        }

        let response = handle
            .put_object_with_content_type(key, &data, content_type)
            .await
            .map_err(|e| StorageError::from_s3(e, bucket, key))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::from_status(
                status,
                response.as_slice(),
                bucket,
                key,
            ));
        }
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        let result = self.bucket(bucket)?.head_object(key).await;

        let (head, status) = match result {
            Ok(pair) => pair,
            Err(e) => match StorageError::from_s3(e, bucket, key) {
                StorageError::NotFound(_) => return Ok(None),
                other => return Err(other),
            },
        };

        match status {
            200..=299 => Ok(Some(ObjectHead {
                content_length: head.content_length.and_then(|len| u64::try_from(len).ok()),
                metadata: head.metadata.unwrap_or_default(),
            })),
            // HEAD responses carry no body, so a missing bucket is indistinguishable here
            404 => Ok(None),
            other => Err(StorageError::from_status(other, &[], bucket, key)),
        }
    }
}

/// In-process object store. Used for local runs and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket so reads against it report `NotFound` instead of
    /// `BucketNotFound`.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket.to_string())
            .or_default();
    }

    /// Seed an object directly, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    content_type: content_type.to_string(),
                    metadata: ObjectMetadata::new(),
                },
            );
    }

    /// Snapshot of a stored object, including its metadata.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data,
                    content_type: content_type.to_string(),
                    metadata: metadata.clone(),
                },
            );
        Ok(())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        Ok(self.object(bucket, key).map(|object| ObjectHead {
            content_length: Some(object.data.len() as u64),
            metadata: object.metadata,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Storage request failed: {0}")]
    Transport(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound(format!("{bucket}/{key}"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "STORAGE_NOT_FOUND",
            StorageError::AccessDenied(_) => "STORAGE_ACCESS_DENIED",
            StorageError::BucketNotFound(_) => "STORAGE_BUCKET_NOT_FOUND",
            StorageError::Transport(_) | StorageError::Config(_) => "STORAGE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::NotFound(_) | StorageError::BucketNotFound(_) => StatusCode::NOT_FOUND,
            StorageError::AccessDenied(_) => StatusCode::FORBIDDEN,
            StorageError::Transport(_) => StatusCode::BAD_GATEWAY,
            StorageError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a non-2xx S3 response.
    fn from_status(status: u16, body: &[u8], bucket: &str, key: &str) -> Self {
        let body = String::from_utf8_lossy(body);
        match status {
            404 if body.contains("NoSuchBucket") => Self::BucketNotFound(bucket.to_string()),
            404 => Self::not_found(bucket, key),
            403 => Self::AccessDenied(format!("{bucket}/{key}")),
            other => Self::Transport(format!("{bucket}/{key}: HTTP {other}")),
        }
    }

    fn from_s3(err: S3Error, bucket: &str, key: &str) -> Self {
        match err {
            S3Error::HttpFailWithBody(status, body) => {
                Self::from_status(status, body.as_bytes(), bucket, key)
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = StorageError::from_status(404, b"<Code>NoSuchKey</Code>", "b", "k");
        assert!(matches!(err, StorageError::NotFound(ref s) if s == "b/k"));

        let err = StorageError::from_status(404, b"<Code>NoSuchBucket</Code>", "b", "k");
        assert!(matches!(err, StorageError::BucketNotFound(_)));

        let err = StorageError::from_status(403, b"", "b", "k");
        assert!(matches!(err, StorageError::AccessDenied(_)));

        let err = StorageError::from_status(500, b"", "b", "k");
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_with_metadata() {
        let store = MemoryObjectStore::new();
        let mut metadata = ObjectMetadata::new();
        metadata.insert("content-hash".into(), "abc".into());

        store
            .put("out", "a.webp", Bytes::from_static(b"data"), "image/webp", &metadata)
            .await
            .unwrap();

        assert_eq!(store.get("out", "a.webp").await.unwrap(), Bytes::from_static(b"data"));
        let head = store.head("out", "a.webp").await.unwrap().unwrap();
        assert_eq!(head.content_length, Some(4));
        assert_eq!(head.metadata.get("content-hash").map(String::as_str), Some("abc"));
        assert!(store.exists("out", "a.webp").await.unwrap());
        assert!(!store.exists("out", "missing.webp").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_missing_bucket_and_key() {
        let store = MemoryObjectStore::new();
        store.create_bucket("in");

        let err = store.get("in", "nope.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = store.get("other", "nope.png").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }
}
