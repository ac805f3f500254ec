use crate::{handlers::xml_escape, services::storage_service::StorageError};
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::error;

/// An HTTP-facing error rendered as an S3-style XML error envelope.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, error code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let xml = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Error><Code>{}</Code><Message>{}</Message></Error>"#
            ),
            self.code,
            xml_escape(&self.message)
        );

        let mut response = (self.status, xml).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml"),
        );
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::InvalidName { .. } => Self::bad_request("InvalidBucketName", message),
            StorageError::InvalidKey => Self::bad_request("InvalidArgument", message),
            StorageError::NotAllowed(_) => Self::bad_request("AccessDenied", message),
            StorageError::NotFound(_) | StorageError::BucketNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "NoSuchBucket", message)
            }
            StorageError::ObjectNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NoSuchKey", message)
            }
            StorageError::AlreadyExists(_) => {
                Self::new(StatusCode::CONFLICT, "BucketAlreadyExists", message)
            }
            StorageError::NotEmpty(_) => {
                Self::new(StatusCode::CONFLICT, "BucketNotEmpty", message)
            }
            StorageError::Io(io_err) => {
                error!("storage I/O failure: {}", io_err);
                Self::internal(message)
            }
        }
    }
}
