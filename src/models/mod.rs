//! Record types persisted in the bucket and object index files.
//!
//! Timestamps are kept in their string-encoded RFC3339 form so rows read
//! back from disk are reproduced exactly when the index is rewritten.

pub mod bucket;
pub mod object;
