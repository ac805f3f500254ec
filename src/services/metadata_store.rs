//! src/services/metadata_store.rs
//!
//! MetadataStore — owns the delimited-text index files:
//! - `{base_path}/buckets.csv` with one row per bucket
//! - `{base_path}/{bucket}/objects.csv` with one row per object
//!
//! Every rewrite goes through a temp file in the same directory followed by a
//! rename over the original, so an interrupted rewrite leaves either the old
//! or the new file in place, never a truncated one.
//!
//! Index files are handled as bytes. A record that does not decode as UTF-8
//! is skipped on read and carried through rewrites unchanged.

use crate::{
    models::{bucket::BucketRecord, object::ObjectRecord},
    services::storage_service::StorageResult,
};
use std::{
    io::{self, ErrorKind},
    mem,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::debug;
use uuid::Uuid;

pub const BUCKET_INDEX_FILE: &str = "buckets.csv";
pub const OBJECT_INDEX_FILE: &str = "objects.csv";

const BUCKET_HEADER: [&str; 3] = ["Name", "CreationTime", "LastModifiedTime"];
const OBJECT_HEADER: [&str; 4] = ["ObjectKey", "Size", "ContentType", "LastModified"];

/// Reads and rewrites the bucket and object index files.
///
/// Clones share one write lock, so read-modify-write cycles issued through
/// any clone are serialized within the process.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    base_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn bucket_index_path(&self) -> PathBuf {
        self.base_path.join(BUCKET_INDEX_FILE)
    }

    pub fn object_index_path(bucket_path: &Path) -> PathBuf {
        bucket_path.join(OBJECT_INDEX_FILE)
    }

    /// Create `buckets.csv` with its header row unless it already exists.
    pub async fn init_bucket_index(&self) -> StorageResult<()> {
        create_with_header(&self.bucket_index_path(), &BUCKET_HEADER).await
    }

    /// Append `(name, timestamp, timestamp)` to the bucket index.
    ///
    /// Uniqueness is the caller's concern. Fails if the index file is missing.
    pub async fn append_bucket(&self, name: &str, timestamp: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.bucket_index_path();
        let mut file = OpenOptions::new().append(true).open(&path).await?;
        file.write_all(encode_record(&[name, timestamp, timestamp]).as_bytes())
            .await?;
        file.flush().await?;
        debug!("appended bucket `{}` to {}", name, path.display());
        Ok(())
    }

    /// All bucket rows, in file order. Rows with fewer than three fields are
    /// skipped.
    pub async fn read_all_buckets(&self) -> StorageResult<Vec<BucketRecord>> {
        let rows = read_data_rows(&self.bucket_index_path()).await?;
        Ok(rows
            .iter()
            .filter_map(Record::decode)
            .filter_map(|row| BucketRecord::from_row(&row))
            .collect())
    }

    /// Rewrite the bucket index without the row(s) named `name`.
    pub async fn remove_bucket(&self, name: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.bucket_index_path();
        let rows = read_data_rows(&path).await?;
        let kept: Vec<Record> = rows.into_iter().filter(|row| !row.has_key(name)).collect();
        rewrite(&path, &BUCKET_HEADER, &kept).await?;
        debug!("removed bucket `{}` from {}", name, path.display());
        Ok(())
    }

    /// Create `{bucket_path}/objects.csv` with its header row unless it
    /// already exists.
    pub async fn init_object_index(&self, bucket_path: &Path) -> StorageResult<()> {
        create_with_header(&Self::object_index_path(bucket_path), &OBJECT_HEADER).await
    }

    /// Object rows for one bucket, in file order. Malformed rows are skipped.
    #[cfg(test)]
    pub async fn read_all_objects(&self, bucket_path: &Path) -> StorageResult<Vec<ObjectRecord>> {
        let rows = read_data_rows(&Self::object_index_path(bucket_path)).await?;
        Ok(rows
            .iter()
            .filter_map(Record::decode)
            .filter_map(|row| ObjectRecord::from_row(&row))
            .collect())
    }

    /// Fail unless the bucket's object index can be read.
    pub async fn check_object_index(&self, bucket_path: &Path) -> StorageResult<()> {
        read_data_rows(&Self::object_index_path(bucket_path)).await?;
        Ok(())
    }

    /// Insert or replace the row for `record.key`.
    ///
    /// The whole index is rewritten: rows for other keys are kept verbatim,
    /// the first row for this key is replaced in place (later duplicates are
    /// dropped), or the row is appended when the key is new.
    pub async fn upsert_object(
        &self,
        bucket_path: &Path,
        record: &ObjectRecord,
    ) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = Self::object_index_path(bucket_path);
        let rows = read_data_rows(&path).await?;

        let new_row = Record::from_fields(&record.to_row());
        let mut updated = false;
        let mut out = Vec::with_capacity(rows.len() + 1);
        for row in rows {
            if row.has_key(&record.key) {
                if !updated {
                    out.push(new_row.clone());
                    updated = true;
                }
            } else {
                out.push(row);
            }
        }
        if !updated {
            out.push(new_row);
        }

        rewrite(&path, &OBJECT_HEADER, &out).await?;
        debug!(
            "{} object `{}` in {}",
            if updated { "updated" } else { "added" },
            record.key,
            path.display()
        );
        Ok(())
    }

    /// Rewrite the object index without the row(s) for `key`.
    pub async fn remove_object_row(&self, bucket_path: &Path, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = Self::object_index_path(bucket_path);
        let rows = read_data_rows(&path).await?;
        let kept: Vec<Record> = rows.into_iter().filter(|row| !row.has_key(key)).collect();
        rewrite(&path, &OBJECT_HEADER, &kept).await?;
        debug!("removed object `{}` from {}", key, path.display());
        Ok(())
    }
}

/// Create `path` holding only `header`. Leaves an existing file untouched.
async fn create_with_header(path: &Path, header: &[&str]) -> StorageResult<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    file.write_all(encode_record(header).as_bytes()).await?;
    file.flush().await?;
    debug!("initialized index {}", path.display());
    Ok(())
}

/// One record of an index file: its fields as raw bytes plus the exact line
/// it was read from (without the terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    fields: Vec<Vec<u8>>,
    raw: Vec<u8>,
}

impl Record {
    fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut raw = encode_record(fields).into_bytes();
        raw.pop();
        Self {
            fields: fields
                .iter()
                .map(|f| f.as_ref().as_bytes().to_vec())
                .collect(),
            raw,
        }
    }

    fn has_key(&self, key: &str) -> bool {
        self.fields.first().map(Vec::as_slice) == Some(key.as_bytes())
    }

    /// The fields as strings, or `None` if any of them is not UTF-8.
    fn decode(&self) -> Option<Vec<String>> {
        self.fields
            .iter()
            .map(|f| String::from_utf8(f.clone()).ok())
            .collect()
    }

    /// Bytes to write back, newline included. Records that decode are
    /// re-encoded; the rest are written exactly as read.
    fn encode(&self) -> Vec<u8> {
        match self.decode() {
            Some(fields) => encode_record(&fields).into_bytes(),
            None => {
                let mut line = self.raw.clone();
                line.push(b'\n');
                line
            }
        }
    }
}

/// Read every row after the header. A file without even a header row is
/// structurally broken and reported as `InvalidData`.
async fn read_data_rows(path: &Path) -> StorageResult<Vec<Record>> {
    let contents = fs::read(path).await?;
    let mut records = parse_records(&contents);
    if records.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("index file {} has no header row", path.display()),
        )
        .into());
    }
    records.remove(0);
    Ok(records)
}

/// Replace `path` with `header` + `rows` via temp file and rename.
async fn rewrite(path: &Path, header: &[&str], rows: &[Record]) -> StorageResult<()> {
    let mut contents = encode_record(header).into_bytes();
    for row in rows {
        contents.extend_from_slice(&row.encode());
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("index");
    let tmp_path = path.with_file_name(format!(".{}.tmp-{}", file_name, Uuid::new_v4()));

    if let Err(err) = write_synced(&tmp_path, &contents).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

/// Whether `file_name` is a temp file left behind by an interrupted rewrite
/// of the object index.
pub fn is_index_rewrite_leftover(file_name: &str) -> bool {
    file_name
        .strip_prefix(".")
        .and_then(|rest| rest.strip_prefix(OBJECT_INDEX_FILE))
        .and_then(|rest| rest.strip_prefix(".tmp-"))
        .is_some_and(|id| Uuid::parse_str(id).is_ok())
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Encode one record as a comma-separated line terminated by `\n`.
///
/// Fields containing a comma, quote, CR or LF, or starting with whitespace,
/// are quoted with embedded quotes doubled.
fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        let field = field.as_ref();
        if needs_quotes(field) {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    line
}

fn needs_quotes(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    field.contains([',', '"', '\r', '\n'])
        || field.starts_with(char::is_whitespace)
}

/// Parse comma-separated records. Quoted fields may contain commas, doubled
/// quotes and line breaks. Blank lines are skipped and `\r\n` is accepted as
/// a line terminator. All delimiters are ASCII, so parsing works on bytes
/// and leaves decoding to the caller.
fn parse_records(input: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut in_quotes = false;
    let mut dirty = false;
    let mut start = 0;

    let mut pos = 0;
    while pos < input.len() {
        let b = input[pos];
        pos += 1;

        if in_quotes {
            if b == b'"' {
                if input.get(pos) == Some(&b'"') {
                    pos += 1;
                    field.push(b'"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(b);
            }
            continue;
        }

        match b {
            b'"' if field.is_empty() => {
                in_quotes = true;
                dirty = true;
            }
            b',' => {
                fields.push(mem::take(&mut field));
                dirty = true;
            }
            b'\r' if input.get(pos) == Some(&b'\n') => {}
            b'\n' => {
                if dirty {
                    fields.push(mem::take(&mut field));
                    let line = &input[start..pos - 1];
                    records.push(Record {
                        fields: mem::take(&mut fields),
                        raw: line.strip_suffix(b"\r").unwrap_or(line).to_vec(),
                    });
                }
                dirty = false;
                start = pos;
            }
            _ => {
                field.push(b);
                dirty = true;
            }
        }
    }
    if dirty {
        fields.push(field);
        records.push(Record {
            fields,
            raw: input[start..].to_vec(),
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn object(key: &str, size: u64) -> ObjectRecord {
        ObjectRecord {
            key: key.to_string(),
            size,
            content_type: "text/plain".into(),
            last_modified: "2025-01-01T00:00:00Z".into(),
        }
    }

    async fn store_with_bucket_dir() -> (MetadataStore, TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        store.init_bucket_index().await.unwrap();
        let bucket_path = dir.path().join("photos");
        fs::create_dir(&bucket_path).await.unwrap();
        store.init_object_index(&bucket_path).await.unwrap();
        (store, dir, bucket_path)
    }

    #[test]
    fn encodes_plain_and_quoted_fields() {
        assert_eq!(encode_record(&["a", "b", "c"]), "a,b,c\n");
        assert_eq!(encode_record(&["a,b", "say \"hi\""]), "\"a,b\",\"say \"\"hi\"\"\"\n");
        assert_eq!(encode_record(&[" lead", ""]), "\" lead\",\n");
    }

    fn parse_decoded(input: &[u8]) -> Vec<Vec<String>> {
        parse_records(input).iter().filter_map(Record::decode).collect()
    }

    #[test]
    fn parses_quoted_fields_and_skips_blank_lines() {
        let input = b"h1,h2\r\n\n\"a,b\",\"x\"\"y\"\n\"multi\nline\",z\n";
        let records = parse_decoded(input);
        assert_eq!(
            records,
            vec![
                vec!["h1".to_string(), "h2".to_string()],
                vec!["a,b".to_string(), "x\"y".to_string()],
                vec!["multi\nline".to_string(), "z".to_string()],
            ]
        );
    }

    #[test]
    fn parses_record_without_trailing_newline() {
        assert_eq!(
            parse_decoded(b"a,,c"),
            vec![vec!["a".to_string(), String::new(), "c".to_string()]]
        );
    }

    #[test]
    fn raw_line_excludes_terminator() {
        let records = parse_records(b"a,b\r\n\"c\nd\",e\n");
        assert_eq!(records[0].raw, b"a,b");
        assert_eq!(records[1].raw, b"\"c\nd\",e");
    }

    #[test]
    fn recognizes_rewrite_leftovers() {
        let leftover = format!(".objects.csv.tmp-{}", Uuid::new_v4());
        assert!(is_index_rewrite_leftover(&leftover));
        assert!(!is_index_rewrite_leftover(".objects.csv.tmp-notes"));
        assert!(!is_index_rewrite_leftover("objects.csv"));
    }

    #[tokio::test]
    async fn init_bucket_index_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        store.init_bucket_index().await.unwrap();
        store.append_bucket("alpha", "2025-01-01T00:00:00Z").await.unwrap();
        store.init_bucket_index().await.unwrap();

        let contents = fs::read_to_string(store.bucket_index_path()).await.unwrap();
        assert_eq!(
            contents,
            "Name,CreationTime,LastModifiedTime\nalpha,2025-01-01T00:00:00Z,2025-01-01T00:00:00Z\n"
        );
    }

    #[tokio::test]
    async fn append_fails_without_index() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        let err = store.append_bucket("alpha", "t").await.unwrap_err();
        assert!(matches!(err, crate::services::storage_service::StorageError::Io(_)));
    }

    #[tokio::test]
    async fn read_all_buckets_skips_short_rows() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        fs::write(
            store.bucket_index_path(),
            "Name,CreationTime,LastModifiedTime\nalpha,t1,t1\nbroken,t2\nbeta,t3,t4\n",
        )
        .await
        .unwrap();

        let buckets = store.read_all_buckets().await.unwrap();
        let names: Vec<_> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(buckets[1].last_modified_time, "t4");
    }

    #[tokio::test]
    async fn empty_index_is_a_structural_error() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        fs::write(store.bucket_index_path(), "").await.unwrap();

        let err = store.read_all_buckets().await.unwrap_err();
        match err {
            crate::services::storage_service::StorageError::Io(io_err) => {
                assert_eq!(io_err.kind(), ErrorKind::InvalidData)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_bucket_rewrites_without_row() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::new(dir.path());
        store.init_bucket_index().await.unwrap();
        store.append_bucket("alpha", "t1").await.unwrap();
        store.append_bucket("beta", "t2").await.unwrap();

        store.remove_bucket("alpha").await.unwrap();

        let contents = fs::read_to_string(store.bucket_index_path()).await.unwrap();
        assert_eq!(contents, "Name,CreationTime,LastModifiedTime\nbeta,t2,t2\n");

        let mut leftovers = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = leftovers.next_entry().await.unwrap() {
            let name = entry.file_name();
            assert!(!name.to_string_lossy().contains(".tmp-"), "stray {name:?}");
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_key() {
        let (store, _dir, bucket_path) = store_with_bucket_dir().await;

        store.upsert_object(&bucket_path, &object("a.txt", 1)).await.unwrap();
        store.upsert_object(&bucket_path, &object("b.txt", 2)).await.unwrap();
        store.upsert_object(&bucket_path, &object("a.txt", 10)).await.unwrap();

        let objects = store.read_all_objects(&bucket_path).await.unwrap();
        assert_eq!(objects, vec![object("a.txt", 10), object("b.txt", 2)]);
    }

    #[tokio::test]
    async fn upsert_collapses_existing_duplicates() {
        let (store, _dir, bucket_path) = store_with_bucket_dir().await;
        fs::write(
            MetadataStore::object_index_path(&bucket_path),
            "ObjectKey,Size,ContentType,LastModified\na,1,x,t\nb,2,x,t\na,3,x,t\n",
        )
        .await
        .unwrap();

        store.upsert_object(&bucket_path, &object("a", 7)).await.unwrap();

        let contents = fs::read_to_string(MetadataStore::object_index_path(&bucket_path))
            .await
            .unwrap();
        assert_eq!(
            contents,
            "ObjectKey,Size,ContentType,LastModified\na,7,text/plain,2025-01-01T00:00:00Z\nb,2,x,t\n"
        );
    }

    #[tokio::test]
    async fn remove_object_row_drops_only_that_key() {
        let (store, _dir, bucket_path) = store_with_bucket_dir().await;
        store.upsert_object(&bucket_path, &object("a", 1)).await.unwrap();
        store.upsert_object(&bucket_path, &object("b", 2)).await.unwrap();

        store.remove_object_row(&bucket_path, "a").await.unwrap();

        let objects = store.read_all_objects(&bucket_path).await.unwrap();
        assert_eq!(objects, vec![object("b", 2)]);
    }

    #[tokio::test]
    async fn non_utf8_rows_are_skipped_and_preserved() {
        let (store, _dir, bucket_path) = store_with_bucket_dir().await;
        let index_path = MetadataStore::object_index_path(&bucket_path);
        fs::write(
            &index_path,
            b"ObjectKey,Size,ContentType,LastModified\n\xFFbad,1,x,t\nok.txt,2,x,t\n",
        )
        .await
        .unwrap();

        let objects = store.read_all_objects(&bucket_path).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "ok.txt");

        store.upsert_object(&bucket_path, &object("new.txt", 3)).await.unwrap();
        store.remove_object_row(&bucket_path, "ok.txt").await.unwrap();

        let contents = fs::read(&index_path).await.unwrap();
        assert_eq!(
            contents,
            b"ObjectKey,Size,ContentType,LastModified\n\xFFbad,1,x,t\n\
              new.txt,3,text/plain,2025-01-01T00:00:00Z\n"
        );
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_rows() {
        let (store, _dir, bucket_path) = store_with_bucket_dir().await;

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let store = store.clone();
            let bucket_path = bucket_path.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_object(&bucket_path, &object(&format!("k{i}"), i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.read_all_objects(&bucket_path).await.unwrap().len(), 16);
    }
}
