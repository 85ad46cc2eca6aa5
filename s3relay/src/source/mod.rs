//! Streamed download sources.
//!
//! A [`ChunkSource`] opens a URL and hands back a lazy, finite stream of byte
//! chunks. Nothing is read until the stream is polled, and dropping the stream
//! releases the underlying connection.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use s3relay::source::{ChunkSource, HttpSource};
//!
//! let source = HttpSource::new(1024 * 1024)?;
//! let mut chunks = source.open("https://example.com/data.csv").await?;
//! while let Some(chunk) = chunks.next().await {
//!     let chunk = chunk?;
//!     println!("read {} bytes", chunk.len());
//! }
//! ```

mod http;

pub use http::{rechunk, HttpSource, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_SECS};

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::relay::RelayError;
use crate::storage::BoxFuture;

/// Lazy sequence of body chunks. Errors end the stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// Something that can be opened as a chunk stream.
pub trait ChunkSource: Send + Sync {
    /// Open `url` and return its body as a chunk stream.
    ///
    /// # Errors
    ///
    /// `RelayError::SourceUnavailable` if no connection can be made or the
    /// server answers with a non-success status. Errors while reading the
    /// body surface as `RelayError::TransferInterrupted` items on the stream.
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ChunkStream, RelayError>>;
}
