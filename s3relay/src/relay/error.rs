//! Relay error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::{StorageError, StorageErrorKind};

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can end a relay operation.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The source could not be reached or answered with a non-success status.
    #[error("source {url} unavailable: {reason}")]
    SourceUnavailable { url: String, reason: String },

    /// The download broke off after it had started.
    #[error("transfer from {url} interrupted after {bytes_read} bytes: {reason}")]
    TransferInterrupted {
        url: String,
        bytes_read: u64,
        reason: String,
    },

    /// The backend refused to open a multipart session.
    #[error("failed to initiate upload: {0}")]
    UploadInitFailed(#[source] StorageError),

    /// The backend rejected a part.
    #[error("failed to upload part {part_number}: {source}")]
    PartUploadFailed {
        part_number: i32,
        #[source]
        source: StorageError,
    },

    /// The source needs more parts than the backend allows in one upload.
    #[error("upload exceeds the limit of {limit} parts")]
    TooManyParts { limit: i32 },

    /// The backend rejected the assembled part list.
    #[error("failed to complete upload: {0}")]
    CompletionFailed(#[source] StorageError),

    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller cancelled the relay.
    #[error("relay cancelled")]
    Cancelled,

    /// Anything else.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl RelayError {
    /// The storage failure behind this error, if it came from the backend.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            RelayError::UploadInitFailed(e) | RelayError::CompletionFailed(e) => Some(e),
            RelayError::PartUploadFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true for download-side failures.
    pub fn is_download_failure(&self) -> bool {
        matches!(
            self,
            RelayError::SourceUnavailable { .. } | RelayError::TransferInterrupted { .. }
        )
    }

    /// Human-readable message reported across the invocation boundary.
    ///
    /// Never includes raw backend payloads; only the backend code for
    /// unclassified storage failures.
    pub fn user_message(&self) -> String {
        if let Some(storage) = self.storage_error() {
            match storage.kind {
                StorageErrorKind::ContainerMissing => {
                    return "The destination S3 bucket does not exist".to_string()
                }
                StorageErrorKind::AccessDenied => {
                    return "Access denied to the destination S3 bucket".to_string()
                }
                StorageErrorKind::Other => {}
            }
        }

        match self {
            RelayError::SourceUnavailable { .. } => "Failed to download the file".to_string(),
            RelayError::TransferInterrupted { .. } => {
                "The file download was interrupted before completion".to_string()
            }
            RelayError::UploadInitFailed(e) => {
                format!("Failed to start the upload to S3 (code: {})", e.code)
            }
            RelayError::PartUploadFailed {
                part_number,
                source,
            } => format!(
                "Failed to upload part {} to S3 (code: {})",
                part_number, source.code
            ),
            RelayError::CompletionFailed(e) => {
                format!("Failed to complete the upload to S3 (code: {})", e.code)
            }
            RelayError::TooManyParts { limit } => format!(
                "The file needs more than {} parts; increase the part size",
                limit
            ),
            RelayError::Config(e) => format!("Invalid configuration: {}", e),
            RelayError::Cancelled => "The upload was cancelled".to_string(),
            RelayError::Unexpected(_) => "An unexpected error occurred".to_string(),
        }
    }
}
