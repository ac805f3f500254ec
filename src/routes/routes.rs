//! Defines routes for bucket and object operations.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `GET    /` or `/{bucket}` — list all buckets
//!   - `PUT    /{bucket}` — create bucket
//!   - `DELETE /{bucket}` — delete bucket
//!
//! - **Object-level endpoints**
//!   - `PUT    /{bucket}/{key}` — upload object
//!   - `GET    /{bucket}/{key}` — download object
//!   - `DELETE /{bucket}/{key}` — delete object
//!
//! - **Health endpoints**
//!   - `GET    /_health/healthz` and `/_health/readyz`
//!
//! The key is captured with a wildcard so deeper paths reach the object
//! handlers, which reject them with 400 instead of a bare 404. Health probes
//! sit under `_health`, which is never a valid bucket name, so every valid
//! name stays routable as a bucket.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, list_buckets},
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, get_object, upload_object},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    routing::{get, put},
};

/// Build the router. Carries `StorageService` as shared state to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints
        .route("/_health/healthz", get(healthz))
        .route("/_health/readyz", get(readyz))
        .route("/", get(list_buckets))
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            put(upload_object).get(get_object).delete(delete_object),
        )
        // Bucket-level routes
        .route(
            "/{bucket}",
            get(list_buckets).put(create_bucket).delete(delete_bucket),
        )
}
