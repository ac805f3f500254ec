//! src/services/object_store.rs
//!
//! ObjectStore — bucket directories and object payload files on local disk,
//! laid out as `base_path/{bucket}/{key}`. Every metadata mutation is handed
//! to [`MetadataStore`] so directory contents and index rows move together.

use crate::{
    models::{bucket::BucketRecord, object::ObjectRecord},
    services::{
        metadata_store::{MetadataStore, OBJECT_INDEX_FILE, is_index_rewrite_leftover},
        sniff::{SNIFF_LEN, detect_content_type},
        storage_service::{StorageError, StorageResult},
        validation::validate_bucket_name,
    },
};
use bytes::Bytes;
use chrono::{Local, SecondsFormat, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

const UPLOAD_TMP_PREFIX: &str = ".upload-";

/// Result of a successful upload: the index row that was written plus the
/// MD5 of the payload, reported to clients as the ETag.
#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub record: ObjectRecord,
    pub etag: String,
}

#[derive(Clone, Debug)]
pub struct ObjectStore {
    base_path: PathBuf,
    metadata: MetadataStore,
}

impl ObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            metadata: MetadataStore::new(base_path.clone()),
            base_path,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Physical directory for a bucket. Does not check existence.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Resolve an existing bucket directory for object-level operations.
    ///
    /// Names that fail validation can never have been created, so they are
    /// reported as missing rather than resolved against the data dir.
    async fn existing_bucket(&self, bucket_name: &str) -> StorageResult<PathBuf> {
        let not_found = || StorageError::BucketNotFound(bucket_name.to_string());
        if validate_bucket_name(bucket_name).is_err() {
            return Err(not_found());
        }
        let root = self.bucket_root(bucket_name);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(not_found()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(err) => Err(err.into()),
        }
    }

    /// Path of an existing payload file, or `ObjectNotFound`.
    async fn existing_object(
        &self,
        bucket_name: &str,
        root: &Path,
        key: &str,
    ) -> StorageResult<PathBuf> {
        let path = root.join(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(object_not_found(bucket_name, key)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(object_not_found(bucket_name, key))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Create the bucket directory and append its index row.
    ///
    /// A directory created without a matching row is left in place and
    /// reported as an I/O failure.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<BucketRecord> {
        validate_bucket_name(name).map_err(|reason| StorageError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        let root = self.bucket_root(name);
        match fs::create_dir(&root).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(err) = self.metadata.append_bucket(name, &now).await {
            error!(
                "bucket directory {} created but index append failed: {}",
                root.display(),
                err
            );
            return Err(err);
        }

        Ok(BucketRecord {
            name: name.to_string(),
            creation_time: now.clone(),
            last_modified_time: now,
        })
    }

    /// Buckets as recorded in the bucket index.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketRecord>> {
        self.metadata.read_all_buckets().await
    }

    /// Remove an empty bucket: its object index, its directory, then its row.
    ///
    /// Temp files left by interrupted uploads or index rewrites do not count
    /// as contents and are removed along with the bucket.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name).map_err(|reason| StorageError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        let root = self.bucket_root(name);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StorageError::NotFound(name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let mut leftovers = Vec::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if file_name == OBJECT_INDEX_FILE {
                continue;
            }
            match file_name.to_str() {
                Some(file_name) if is_store_leftover(file_name) => leftovers.push(entry.path()),
                _ => return Err(StorageError::NotEmpty(name.to_string())),
            }
        }
        for path in leftovers {
            warn!("removing leftover temp file {}", path.display());
            fs::remove_file(&path).await?;
        }

        match fs::remove_file(MetadataStore::object_index_path(&root)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::remove_dir(&root).await?;
        debug!("removed bucket directory {}", root.display());

        self.metadata.remove_bucket(name).await
    }

    /// Stream a payload into `{bucket}/{key}` and upsert its index row.
    ///
    /// - Writes into a temp file in the bucket directory, then renames it
    ///   over the target, fully replacing any previous payload.
    /// - Size is the number of bytes actually written.
    /// - The caller-supplied content type is recorded as-is.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        stream: S,
    ) -> StorageResult<UploadedObject>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let root = self.existing_bucket(bucket).await?;
        if key.trim().is_empty() {
            return Err(StorageError::InvalidKey);
        }
        ensure_not_reserved(key)?;

        self.metadata.init_object_index(&root).await?;

        let file_path = root.join(key);
        let existed = fs::try_exists(&file_path).await?;
        let tmp_path = root.join(format!("{}{}", UPLOAD_TMP_PREFIX, Uuid::new_v4()));

        let (size, digest) = match write_stream(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        };
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        debug!("wrote {} bytes to {}", size, file_path.display());

        let record = ObjectRecord {
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
            last_modified: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };

        if let Err(err) = self.metadata.upsert_object(&root, &record).await {
            if existed {
                error!(
                    "payload {} replaced but index upsert failed: {}",
                    file_path.display(),
                    err
                );
            } else {
                let _ = fs::remove_file(&file_path).await;
            }
            return Err(err);
        }

        Ok(UploadedObject {
            record,
            etag: format!("{:x}", digest.compute()),
        })
    }

    /// Read a payload in full. The returned content type is sniffed from the
    /// leading bytes, independent of what the uploader declared.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Bytes, &'static str)> {
        let root = self.existing_bucket(bucket).await?;
        ensure_not_reserved(key)?;
        let path = self.existing_object(bucket, &root, key).await?;

        let data = fs::read(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                object_not_found(bucket, key)
            } else {
                StorageError::Io(err)
            }
        })?;
        let content_type = detect_content_type(&data[..data.len().min(SNIFF_LEN)]);

        Ok((Bytes::from(data), content_type))
    }

    /// Remove a payload file and its index row.
    ///
    /// The index is read before the payload goes, so an unreadable index
    /// fails the call with both left intact.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        ensure_not_reserved(key)?;
        let root = self.existing_bucket(bucket).await?;
        let path = self.existing_object(bucket, &root, key).await?;
        self.metadata.check_object_index(&root).await?;

        fs::remove_file(&path).await?;
        debug!("removed payload {}", path.display());

        self.metadata.remove_object_row(&root, key).await
    }
}

/// The object index lives beside the payloads, so its name is unusable as a key.
fn ensure_not_reserved(key: &str) -> StorageResult<()> {
    if key == OBJECT_INDEX_FILE {
        return Err(StorageError::NotAllowed(key.to_string()));
    }
    Ok(())
}

/// Temp files this store creates inside bucket directories.
fn is_store_leftover(file_name: &str) -> bool {
    let upload = file_name
        .strip_prefix(UPLOAD_TMP_PREFIX)
        .is_some_and(|id| Uuid::parse_str(id).is_ok());
    upload || is_index_rewrite_leftover(file_name)
}

fn object_not_found(bucket: &str, key: &str) -> StorageError {
    StorageError::ObjectNotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

/// Drain `stream` into a fresh file at `path`, returning the byte count and
/// running MD5. The file handle is synced and closed before returning.
async fn write_stream<S>(path: &Path, stream: S) -> io::Result<(u64, Context)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size: u64 = 0;
    let mut digest = Context::new();

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size += chunk.len() as u64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size, digest))
}
