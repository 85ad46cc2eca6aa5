//! Part accumulation and multipart upload.
//!
//! This module turns a chunk stream into one committed object:
//!
//! ```text
//! ChunkStream ──► UploadDriver ──► PartBuffer (cut at part_size)
//!                      │
//!                      └──► MultipartBackend: create → upload_part × N → complete
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use s3relay::relay::{relay, RelayRequest};
//! use s3relay::source::HttpSource;
//! use s3relay::storage::S3Backend;
//!
//! let source = HttpSource::new(1024 * 1024)?;
//! let backend = Arc::new(S3Backend::connect(None, None).await);
//! let request = RelayRequest {
//!     url: "https://example.com/data.csv".to_string(),
//!     bucket: "my-bucket".to_string(),
//!     key: "incoming/data.csv".to_string(),
//!     part_size: 5 * 1024 * 1024,
//!     max_part_attempts: 1,
//! };
//! let object = relay(&source, backend, &request).await?;
//! ```

mod buffer;
mod error;
mod pipeline;
mod upload;

pub use buffer::PartBuffer;
pub use error::{RelayError, RelayResult};
pub use pipeline::{relay, relay_until, RelayRequest};
pub use upload::{ObjectReference, UploadDriver, UploadState};
