//! Represents a bucket row in `buckets.csv`.

/// A storage bucket, as recorded in the bucket index.
///
/// The bucket index, not the directory listing, is authoritative for the
/// display fields returned by `ListBuckets`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketRecord {
    /// Unique bucket name (also the directory name under the data dir).
    pub name: String,

    /// When this bucket was created (RFC3339).
    pub creation_time: String,

    /// When this bucket was last modified (RFC3339). Buckets are never
    /// updated, so this equals `creation_time` for rows we write.
    pub last_modified_time: String,
}

impl BucketRecord {
    /// Build a record from one data row. Returns `None` for rows with fewer
    /// than three fields; extra trailing fields are ignored.
    pub fn from_row(row: &[String]) -> Option<Self> {
        match row {
            [name, created, modified, ..] => Some(Self {
                name: name.clone(),
                creation_time: created.clone(),
                last_modified_time: modified.clone(),
            }),
            _ => None,
        }
    }
}
