//! Error types for the upload endpoint
//!
//! Every failure of a request is an [`UploadError`]. Its HTTP status and the
//! short plain-text body sent to the client are fixed per variant; the full
//! error chain only goes to the log.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::task::JoinError;
use zone_receiver_core::Error;

/// Errors that can occur while handling an upload request
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UploadError {
    /// The zone name in the path was rejected
    #[error("Invalid zone name: {0}")]
    InvalidZone(#[source] Error),

    /// The multipart body had no `zone` field
    #[error("Request has no 'zone' field")]
    MissingField,

    /// The multipart body could not be read
    #[error("Failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// The zone file exceeded the configured limit
    #[error("Zone file exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes
        limit: u64,
    },

    /// Staging, rename or permission change failed
    #[error("Failed to store zone file: {0}")]
    Storage(#[source] Error),

    /// The blocking commit task panicked or was cancelled
    #[error("Upload worker failed: {0}")]
    Join(#[from] JoinError),
}

impl From<Error> for UploadError {
    fn from(err: Error) -> Self {
        match err {
            Error::UploadTooLarge { limit } => Self::TooLarge { limit },
            err @ Error::InvalidZoneName { .. } => Self::InvalidZone(err),
            err => Self::Storage(err),
        }
    }
}

impl UploadError {
    /// HTTP status returned to the client
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidZone(_) | Self::MissingField => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Storage(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response body, without internal details
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidZone(_) => "invalid zone name\n",
            Self::MissingField => "failed to get 'zone' parameter\n",
            Self::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "zone file too large\n"
            }
            Self::Multipart(_) => "failed to get 'zone' parameter\n",
            Self::TooLarge { .. } => "zone file too large\n",
            Self::Storage(_) | Self::Join(_) => "failed to save zone file\n",
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Upload failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Upload rejected");
        }
        (status, self.public_message()).into_response()
    }
}
