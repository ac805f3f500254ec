//! Represents an object row in a bucket's `objects.csv`.

/// Metadata for a single object payload stored in a bucket directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object key; also the payload file name inside the bucket directory.
    pub key: String,

    /// Payload size in bytes, as observed when the payload was written.
    pub size: u64,

    /// Content type supplied by the uploader.
    pub content_type: String,

    /// Time of the last upload (RFC3339, UTC).
    pub last_modified: String,
}

impl ObjectRecord {
    pub fn to_row(&self) -> [String; 4] {
        [
            self.key.clone(),
            self.size.to_string(),
            self.content_type.clone(),
            self.last_modified.clone(),
        ]
    }

    /// Build a record from one data row. Rows with fewer than four fields or
    /// a non-numeric size are rejected.
    #[cfg(test)]
    pub fn from_row(row: &[String]) -> Option<Self> {
        match row {
            [key, size, content_type, last_modified, ..] => Some(Self {
                key: key.clone(),
                size: size.parse().ok()?,
                content_type: content_type.clone(),
                last_modified: last_modified.clone(),
            }),
            _ => None,
        }
    }
}
