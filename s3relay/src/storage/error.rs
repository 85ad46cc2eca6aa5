//! Storage error type and backend error classification.

use std::fmt;

use thiserror::Error;

/// Error codes that mean the destination bucket does not exist.
const CONTAINER_MISSING_CODES: &[&str] = &["NoSuchBucket"];

/// Error codes that mean the caller is not allowed to write.
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
];

/// Code used when the backend gave no code at all (transport failures).
pub const UNKNOWN_CODE: &str = "Unknown";

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The destination bucket does not exist.
    ContainerMissing,
    /// Credentials were rejected or lack permission.
    AccessDenied,
    /// Anything else; the raw code is kept on the error.
    Other,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::ContainerMissing => write!(f, "bucket missing"),
            StorageErrorKind::AccessDenied => write!(f, "access denied"),
            StorageErrorKind::Other => write!(f, "storage error"),
        }
    }
}

/// A classified failure from an object storage call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} [{code}]: {message}")]
pub struct StorageError {
    /// Classified category.
    pub kind: StorageErrorKind,
    /// Raw backend error code, or `Unknown`.
    pub code: String,
    /// Backend-supplied message.
    pub message: String,
}

impl StorageError {
    /// Classify a backend error code.
    ///
    /// This is the single place backend codes are mapped to a kind; every
    /// backend routes its failures through here.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let kind = if CONTAINER_MISSING_CODES.contains(&code.as_str()) {
            StorageErrorKind::ContainerMissing
        } else if ACCESS_DENIED_CODES.contains(&code.as_str()) {
            StorageErrorKind::AccessDenied
        } else {
            StorageErrorKind::Other
        };

        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// A failure that carries no backend code (e.g. connection reset).
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::from_code(UNKNOWN_CODE, message)
    }

    /// Returns true if the bucket does not exist.
    pub fn is_container_missing(&self) -> bool {
        self.kind == StorageErrorKind::ContainerMissing
    }

    /// Returns true if access was denied.
    pub fn is_access_denied(&self) -> bool {
        self.kind == StorageErrorKind::AccessDenied
    }
}
