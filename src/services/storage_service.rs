//! src/services/storage_service.rs
//!
//! StorageService — the single capability surface the HTTP layer talks to.
//! It threads arguments through to [`ObjectStore`] and surfaces its typed
//! failures unchanged; bucket and object metadata live in CSV side-files
//! beneath `base_path`.

use crate::{
    models::bucket::BucketRecord,
    services::{
        object_store::{ObjectStore, UploadedObject},
        validation::NameViolation,
    },
};
use bytes::Bytes;
use futures::Stream;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket name `{name}` invalid: {reason}")]
    InvalidName {
        name: String,
        #[source]
        reason: NameViolation,
    },
    #[error("bucket `{0}` already exists")]
    AlreadyExists(String),
    #[error("bucket `{0}` not found")]
    NotFound(String),
    #[error("bucket `{0}` is not empty")]
    NotEmpty(String),
    #[error("no bucket named `{0}`")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidKey,
    #[error("object key `{0}` is reserved")]
    NotAllowed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the six storage operations:
/// - Create / list / delete buckets
/// - Upload / get / delete objects
///
/// Cloning is cheap; clones share the underlying store and its index lock.
#[derive(Clone)]
pub struct StorageService {
    store: Arc<ObjectStore>,
}

impl StorageService {
    /// Create a StorageService rooted at `base_path`. Call [`Self::init`]
    /// before serving requests.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(ObjectStore::new(base_path)),
        }
    }

    /// Ensure the data directory and the bucket index exist.
    pub async fn init(&self) -> StorageResult<()> {
        let base = self.base_path();
        if !fs::try_exists(base).await? {
            fs::create_dir_all(base).await?;
            info!("created data directory at {}", base.display());
        }
        self.store.metadata().init_bucket_index().await
    }

    pub fn base_path(&self) -> &Path {
        self.store.base_path()
    }

    pub async fn create_bucket(&self, name: &str) -> StorageResult<BucketRecord> {
        let bucket = self.store.create_bucket(name).await?;
        info!("created bucket `{}`", name);
        Ok(bucket)
    }

    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketRecord>> {
        self.store.list_buckets().await
    }

    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        self.store.delete_bucket(name).await?;
        info!("deleted bucket `{}`", name);
        Ok(())
    }

    pub async fn upload_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        stream: S,
    ) -> StorageResult<UploadedObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let uploaded = self
            .store
            .upload_object_stream(bucket, key, content_type, stream)
            .await?;
        info!(
            "stored object `{}/{}` ({} bytes)",
            bucket, key, uploaded.record.size
        );
        Ok(uploaded)
    }

    /// Returns the payload and its sniffed content type.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Bytes, &'static str)> {
        self.store.get_object(bucket, key).await
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.store.delete_object(bucket, key).await?;
        info!("deleted object `{}/{}`", bucket, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_creates_data_dir_and_index() {
        let dir = TempDir::new().unwrap();
        let service = StorageService::new(dir.path().join("nested").join("data"));
        service.init().await.unwrap();
        service.init().await.unwrap();

        let index = std::fs::read_to_string(service.base_path().join("buckets.csv")).unwrap();
        assert_eq!(index, "Name,CreationTime,LastModifiedTime\n");
    }

    #[tokio::test]
    async fn end_to_end_greeting() {
        let dir = TempDir::new().unwrap();
        let service = StorageService::new(dir.path());
        service.init().await.unwrap();

        service.create_bucket("my-bucket").await.unwrap();
        service
            .upload_object(
                "my-bucket",
                "greeting.txt",
                "text/plain",
                stream::iter(vec![Ok(Bytes::from_static(b"hello"))]),
            )
            .await
            .unwrap();

        let (data, content_type) = service.get_object("my-bucket", "greeting.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(content_type, "text/plain; charset=utf-8");

        let index_path = dir.path().join("my-bucket").join("objects.csv");
        let index = std::fs::read_to_string(index_path).unwrap();
        let lines: Vec<&str> = index.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ObjectKey,Size,ContentType,LastModified");
        assert!(lines[1].starts_with("greeting.txt,5,text/plain,"));
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let dir = TempDir::new().unwrap();
        let service = StorageService::new(dir.path());
        service.init().await.unwrap();

        let err = service.create_bucket("ab").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidName {
                reason: NameViolation::Length,
                ..
            }
        ));

        let err = service.get_object("my-bucket", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }
}
