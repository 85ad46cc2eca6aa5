//! Core types and trait for the multipart storage backend.
//!
//! The `MultipartBackend` trait is the seam between the upload driver and the
//! object store. It exposes exactly the calls a multipart upload needs:
//! create a session, upload a numbered part, complete with the ordered part
//! list, and abort.
//!
//! # Design Principles
//!
//! - **Explicit client**: a backend is a value passed to the driver, never a
//!   process-wide handle
//! - **Bytes payloads**: parts are handed over as `Bytes`, so a buffer can be
//!   frozen and sent without copying
//! - **Classified errors**: every call fails with a `StorageError` whose kind is
//!   decided once, at the call site, by the backend
//! - **Dyn-compatible**: uses `Pin<Box<dyn Future>>` for trait object support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use s3relay::storage::{MemoryBackend, MultipartBackend};
//!
//! let backend: Arc<dyn MultipartBackend> = Arc::new(MemoryBackend::default().with_bucket("data"));
//! let upload_id = backend.create_multipart("data", "report.csv").await?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use super::error::StorageError;

/// Smallest size S3 accepts for every part except the last (5 MiB).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Highest part number S3 accepts in one multipart upload.
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One in-progress multipart upload.
///
/// Created once the backend issues an upload id; consumed by either a
/// completion or an abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Destination bucket.
    pub bucket: String,
    /// Destination object key.
    pub key: String,
    /// Opaque session token issued by the backend.
    pub upload_id: String,
}

impl fmt::Display for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{} (upload {})", self.bucket, self.key, self.upload_id)
    }
}

/// A part the backend has acknowledged.
///
/// Immutable once created. The ordered list of records is only read again
/// when the upload is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 1-based sequence number.
    pub part_number: i32,
    /// Integrity tag returned by the backend (the part's ETag).
    pub etag: String,
    /// Payload length in bytes.
    pub size: usize,
}

/// Multipart upload operations against an object store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the driver holds the backend in an
/// `Arc` so an abandoned upload can still be aborted from a spawned task.
pub trait MultipartBackend: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &str;

    /// Open a new multipart session and return its upload id.
    ///
    /// # Errors
    ///
    /// Fails when the bucket is missing, access is denied, or the request
    /// cannot be delivered.
    fn create_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>>;

    /// Upload one part and return the backend's integrity tag for it.
    ///
    /// Uploading the same part number twice replaces the earlier payload, which
    /// is what makes a retry of a logical part safe.
    fn upload_part<'a>(
        &'a self,
        session: &'a UploadSession,
        part_number: i32,
        body: Bytes,
    ) -> BoxFuture<'a, Result<String, StorageError>>;

    /// Assemble the listed parts into one object and return its ETag, if any.
    ///
    /// `parts` must be in ascending part-number order.
    fn complete_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
        parts: &'a [PartRecord],
    ) -> BoxFuture<'a, Result<Option<String>, StorageError>>;

    /// Cancel the session and discard its parts.
    fn abort_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
    ) -> BoxFuture<'a, Result<(), StorageError>>;
}
