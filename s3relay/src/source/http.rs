//! HTTP source with a streamed response body.
//!
//! The response body is never buffered as a whole: `reqwest`'s byte stream is
//! re-sliced into chunks of at most the configured read size and handed on as
//! it arrives. The connection lives inside the returned stream, so it is
//! released when the stream finishes, fails, or is dropped early.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info};

use super::{ChunkSource, ChunkStream};
use crate::relay::RelayError;
use crate::storage::BoxFuture;

/// Default network read size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default timeout for connecting and for each body read, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// HTTP GET source backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    chunk_size: usize,
    pub(crate) timeout: Duration,
}

impl HttpSource {
    /// Create a source with the default timeout.
    pub fn new(chunk_size: usize) -> Result<Self, RelayError> {
        Self::with_timeout(chunk_size, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a source with a custom timeout.
    ///
    /// The timeout bounds connection setup and every single read of the body.
    /// A long body keeps streaming as long as data keeps arriving; a server
    /// that goes quiet for longer ends the stream with `TransferInterrupted`.
    pub fn with_timeout(chunk_size: usize, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| {
                RelayError::Unexpected(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            chunk_size: chunk_size.max(1),
            timeout,
        })
    }

    /// Network read size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl ChunkSource for HttpSource {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ChunkStream, RelayError>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(|e| {
                let reason = if e.is_timeout() {
                    format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    )
                } else {
                    e.to_string()
                };
                RelayError::SourceUnavailable {
                    url: url.to_string(),
                    reason,
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(RelayError::SourceUnavailable {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                });
            }

            info!(
                url,
                content_length = ?response.content_length(),
                "Source responded, streaming body"
            );

            Ok(rechunk(
                response.bytes_stream().boxed(),
                url.to_string(),
                self.chunk_size,
            ))
        })
    }
}

struct ReadState<E> {
    inner: BoxStream<'static, Result<Bytes, E>>,
    pending: Bytes,
    bytes_read: u64,
    url: String,
    chunk_size: usize,
    finished: bool,
}

/// Re-slice a byte stream into chunks of at most `chunk_size` bytes.
///
/// Slicing uses `Bytes::split_to`, so no payload is copied. The first inner
/// error is reported as `TransferInterrupted` and ends the stream.
pub fn rechunk<E>(
    inner: BoxStream<'static, Result<Bytes, E>>,
    url: String,
    chunk_size: usize,
) -> ChunkStream
where
    E: Display + Send + 'static,
{
    let state = ReadState {
        inner,
        pending: Bytes::new(),
        bytes_read: 0,
        url,
        chunk_size: chunk_size.max(1),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if !state.pending.is_empty() {
                let take = state.pending.len().min(state.chunk_size);
                let chunk = state.pending.split_to(take);
                state.bytes_read += chunk.len() as u64;
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(bytes)) => state.pending = bytes,
                Some(Err(e)) => {
                    state.finished = true;
                    let err = RelayError::TransferInterrupted {
                        url: state.url.clone(),
                        bytes_read: state.bytes_read,
                        reason: e.to_string(),
                    };
                    return Some((Err(err), state));
                }
                None => {
                    debug!(url = %state.url, bytes_read = state.bytes_read, "Source exhausted");
                    return None;
                }
            }
        }
    }))
}
