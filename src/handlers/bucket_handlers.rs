//! HTTP handlers for bucket operations.

use crate::{
    errors::AppError, handlers::xml_escape, models::bucket::BucketRecord,
    services::storage_service::StorageService,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// PUT `/{bucket}` — create bucket.
pub async fn create_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    service.create_bucket(&bucket).await?;

    let xml = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<CreateBucketResult>"#,
            r#"<Location>/{}</Location>"#,
            r#"</CreateBucketResult>"#
        ),
        xml_escape(&bucket)
    );
    Ok(xml_response(StatusCode::OK, xml))
}

/// GET `/` or `/{bucket}` — list all buckets from the bucket index.
pub async fn list_buckets(State(service): State<StorageService>) -> Result<Response, AppError> {
    let buckets = service.list_buckets().await?;
    Ok(xml_response(StatusCode::OK, build_list_buckets_xml(&buckets)))
}

/// DELETE `/{bucket}` — delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn xml_response(status: StatusCode, xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = status;
    response
}

fn build_list_buckets_xml(buckets: &[BucketRecord]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult><Buckets>"#,
    );
    for bucket in buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            xml_escape(&bucket.creation_time)
        ));
        xml.push_str(&format!(
            "<LastModifiedDate>{}</LastModifiedDate>",
            xml_escape(&bucket.last_modified_time)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_xml_contains_every_bucket() {
        let buckets = vec![
            BucketRecord {
                name: "alpha".into(),
                creation_time: "2025-01-01T00:00:00Z".into(),
                last_modified_time: "2025-01-01T00:00:00Z".into(),
            },
            BucketRecord {
                name: "beta".into(),
                creation_time: "2025-02-01T00:00:00+02:00".into(),
                last_modified_time: "2025-02-01T00:00:00+02:00".into(),
            },
        ];
        let xml = build_list_buckets_xml(&buckets);
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult>"#));
        assert!(xml.contains(
            "<Bucket><Name>alpha</Name><CreationDate>2025-01-01T00:00:00Z</CreationDate>\
             <LastModifiedDate>2025-01-01T00:00:00Z</LastModifiedDate></Bucket>"
        ));
        assert!(xml.contains("<Name>beta</Name>"));
    }

    #[test]
    fn empty_listing_is_well_formed() {
        assert_eq!(
            build_list_buckets_xml(&[]),
            r#"<?xml version="1.0" encoding="UTF-8"?><ListAllMyBucketsResult><Buckets></Buckets></ListAllMyBucketsResult>"#
        );
    }
}
