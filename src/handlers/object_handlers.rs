//! HTTP handlers for object operations.
//! Streams upload bodies straight to disk and delegates storage concerns to
//! `StorageService`.

use crate::{errors::AppError, handlers::xml_escape, services::storage_service::StorageService};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tracing::warn;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// PUT `/{bucket}/{key}` — upload an object.
pub async fn upload_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    ensure_single_segment(&key)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    let uploaded = service
        .upload_object(&bucket, &key, &content_type, stream)
        .await?;

    let etag = format!("\"{}\"", uploaded.etag);
    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<PutObjectResult>"#,
            r#"<ETag>{}</ETag>"#,
            r#"<Size>{}</Size>"#,
            r#"</PutObjectResult>"#
        ),
        xml_escape(&etag),
        uploaded.record.size
    );

    let mut response = Response::new(Body::from(xml));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// GET `/{bucket}/{key}` — return the raw payload with a sniffed content type.
pub async fn get_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    ensure_single_segment(&key)?;

    let (data, content_type) = service.get_object(&bucket, &key).await?;
    let length = data.len();

    let mut response = Response::new(Body::from(data));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// DELETE `/{bucket}/{key}` — remove payload and index row.
pub async fn delete_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    ensure_single_segment(&key)?;

    service.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Paths are at most `/{bucket}/{key}`; deeper paths never reach storage.
fn ensure_single_segment(key: &str) -> Result<(), AppError> {
    if key.contains('/') {
        warn!("rejected request for nested key `{}`", key);
        return Err(AppError::bad_request(
            "InvalidURI",
            "can not use more than 2 segments in path",
        ));
    }
    Ok(())
}
