//! Object storage backends for multipart uploads.
//!
//! ```text
//! UploadDriver ──► Arc<dyn MultipartBackend>
//!                         ├── S3Backend      (aws-sdk-s3)
//!                         └── MemoryBackend  (dry runs, tests)
//! ```
//!
//! Every backend classifies its failures into a [`StorageError`] at the call
//! site, so callers match on [`StorageErrorKind`] instead of vendor types.

mod error;
mod memory;
mod s3;
mod traits;

pub use error::{StorageError, StorageErrorKind, UNKNOWN_CODE};
pub use memory::{BackendCall, BackendOp, MemoryBackend, StoredObject};
pub use s3::S3Backend;
pub use traits::{
    BoxFuture, MultipartBackend, PartRecord, UploadSession, MAX_PART_NUMBER, MIN_PART_SIZE,
};
