//! The relay pipeline: source chunks in, committed object out.

use std::future::{self, Future};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use super::error::{RelayError, RelayResult};
use super::upload::{ObjectReference, UploadDriver};
use crate::source::{ChunkSource, ChunkStream};
use crate::storage::MultipartBackend;

/// What to relay and how to cut it into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    /// Source URL.
    pub url: String,
    /// Destination bucket.
    pub bucket: String,
    /// Destination object key.
    pub key: String,
    /// Size at which the buffer is cut into a part.
    pub part_size: usize,
    /// Tries per part (1 means no retry).
    pub max_part_attempts: u32,
}

/// Relay `request.url` into `request.bucket/request.key`.
///
/// The source is opened before any storage call, so an unreachable source
/// never creates a session. Any failure after the session is open aborts it.
pub async fn relay(
    source: &dyn ChunkSource,
    backend: Arc<dyn MultipartBackend>,
    request: &RelayRequest,
) -> RelayResult<ObjectReference> {
    relay_until(source, backend, request, future::pending()).await
}

/// Like [`relay`], but gives up with `RelayError::Cancelled` when `cancel`
/// resolves first. The session is aborted before this returns.
pub async fn relay_until<C>(
    source: &dyn ChunkSource,
    backend: Arc<dyn MultipartBackend>,
    request: &RelayRequest,
    cancel: C,
) -> RelayResult<ObjectReference>
where
    C: Future<Output = ()> + Send,
{
    info!(url = %request.url, "Starting file download");
    let chunks = source.open(&request.url).await?;

    let mut driver = UploadDriver::new(backend, &request.bucket, &request.key, request.part_size)
        .with_max_part_attempts(request.max_part_attempts);
    driver.initiate().await?;

    let outcome = tokio::select! {
        biased;
        _ = cancel => Err(RelayError::Cancelled),
        outcome = pump(&mut driver, chunks) => outcome,
    };

    match outcome {
        Ok(reference) => Ok(reference),
        Err(e) => {
            warn!(error = %e, "Relay failed");
            driver.abort().await;
            Err(e)
        }
    }
}

async fn pump(driver: &mut UploadDriver, mut chunks: ChunkStream) -> RelayResult<ObjectReference> {
    while let Some(chunk) = chunks.next().await {
        driver.ingest(&chunk?).await?;
    }
    drop(chunks);

    driver.finalize().await
}
