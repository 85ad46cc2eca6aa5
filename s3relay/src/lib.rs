//! S3Relay - stream a remote file into S3 without holding it in memory
//!
//! The HTTP response body is read in fixed-size chunks, collected into parts
//! of at least the S3 minimum part size, and sent through a multipart upload
//! that is committed once the body ends, or aborted if anything fails.
//!
//! ```text
//! source::HttpSource ──chunks──► relay::UploadDriver ──parts──► storage::S3Backend
//! ```
//!
//! The [`handler`] module wraps one relay in an invocation boundary that
//! always answers with `{"message": ...}` or `{"error": ...}`.

pub mod config;
pub mod handler;
pub mod logging;
pub mod relay;
pub mod source;
pub mod storage;

pub use config::{ConfigError, RelayConfig};
pub use handler::{handle_event, HandlerResponse, InvocationContext, RelayHandler};
pub use relay::{relay, ObjectReference, RelayError, RelayRequest};
