//! Error taxonomy for the site and its mapping onto HTTP responses.

use std::path::PathBuf;
use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Upper bound on diagnostic text returned to clients.
pub const MAX_DETAILS_CHARS: usize = 2000;

/// Missing or invalid client input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("spawn converter `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wait for converter: {0}")]
    Io(#[source] std::io::Error),

    #[error("converter exited with {status}")]
    Failed { status: String, details: String },

    #[error("converter did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("converter output is not valid JSON: {source}")]
    InvalidOutput {
        details: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("converter reported no pages")]
    NoPages,

    #[error("converter reported pageCount {reported} but listed {listed} pages")]
    PageCountMismatch { reported: usize, listed: usize },

    #[error("converter reported a page file outside its output directory: {0:?}")]
    UnsafePageFile(String),
}

impl ConversionError {
    /// Diagnostic text safe to hand back to a client, already truncated.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::Failed { details, .. } | Self::InvalidOutput { details, .. } => {
                Some(truncate_details(details))
            }
            Self::TimedOut(_)
            | Self::NoPages
            | Self::PageCountMismatch { .. }
            | Self::UnsafePageFile(_) => Some(self.to_string()),
            Self::Spawn { .. } | Self::Io(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON, refusing to overwrite it: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize {collection}: {source}")]
    Serialize {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{collection} already contains id {id}")]
    DuplicateId {
        collection: &'static str,
        id: String,
    },
}

/// Failure of the book ingestion pipeline. The first failing step aborts the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("convert document: {0}")]
    Conversion(#[from] ConversionError),

    #[error("write book index {}: {source}", path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persist book: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("stage upload {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            Self::Internal { details, .. } => details.as_deref(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.message)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::internal("storage failure")
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            UploadError::Io { .. } => {
                tracing::error!(error = %err, "upload failure");
                Self::internal("failed to store upload")
            }
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(err) => err.into(),
            IngestError::Conversion(err) => {
                tracing::error!(error = %err, "book conversion failed");
                Self::Internal {
                    message: "failed to convert document to pages".to_owned(),
                    details: err.details(),
                }
            }
            IngestError::Index { .. } => {
                tracing::error!(error = %err, "book index write failed");
                Self::internal("failed to write book index")
            }
            IngestError::Storage(err) => {
                tracing::error!(error = %err, "book persistence failed");
                Self::internal("failed to persist book")
            }
        }
    }
}

/// Truncates to [`MAX_DETAILS_CHARS`] characters.
pub fn truncate_details(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAILS_CHARS) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}
