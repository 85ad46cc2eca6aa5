//! Multipart upload driver.
//!
//! `UploadDriver` owns one upload session from start to finish:
//!
//! ```text
//! Idle ──initiate──► SessionOpen ──ingest──► Buffering ◄──┐
//!                                              │          │ ack
//!                                              └──► PartUploading
//!                                              │
//!                                  finalize    ▼
//!                                  FinalFlush ──► Completing ──► Committed
//!
//! any error ──abort──► Aborting ──► Failed
//! ```
//!
//! Parts are uploaded strictly one after another, numbered 1..N without gaps.
//! A driver dropped while its session is still open spawns a best-effort abort
//! on the current Tokio runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::buffer::PartBuffer;
use super::error::{RelayError, RelayResult};
use crate::storage::{MultipartBackend, PartRecord, UploadSession, MAX_PART_NUMBER};

/// Base delay between attempts of the same part; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on a single retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Lifecycle state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    SessionOpen,
    Buffering,
    PartUploading,
    FinalFlush,
    Completing,
    Committed,
    Aborting,
    Failed,
}

impl UploadState {
    /// Returns true for `Committed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Committed | UploadState::Failed)
    }
}

/// Reference to a committed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    pub bucket: String,
    pub key: String,
    /// ETag of the assembled object, when the backend returns one.
    pub etag: Option<String>,
    /// Total object size in bytes.
    pub size: u64,
    /// Number of parts the object was assembled from.
    pub parts: usize,
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s3://{}/{} ({} bytes in {} parts)",
            self.bucket, self.key, self.size, self.parts
        )
    }
}

/// Drives one multipart upload.
pub struct UploadDriver {
    backend: Arc<dyn MultipartBackend>,
    bucket: String,
    key: String,
    session: Option<UploadSession>,
    buffer: PartBuffer,
    parts: Vec<PartRecord>,
    state: UploadState,
    bytes_uploaded: u64,
    max_part_attempts: u32,
    retry_base_delay: Duration,
}

impl UploadDriver {
    /// Create a driver for `bucket/key` that cuts parts at `part_size` bytes.
    pub fn new(
        backend: Arc<dyn MultipartBackend>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        part_size: usize,
    ) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            key: key.into(),
            session: None,
            buffer: PartBuffer::new(part_size),
            parts: Vec::new(),
            state: UploadState::Idle,
            bytes_uploaded: 0,
            max_part_attempts: 1,
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }

    /// Allow each part up to `attempts` tries (minimum 1).
    pub fn with_max_part_attempts(mut self, attempts: u32) -> Self {
        self.max_part_attempts = attempts.max(1);
        self
    }

    /// Set the base delay between part retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Parts acknowledged so far, in order.
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// Bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Open the upload session. Must be called before any chunk is ingested.
    pub async fn initiate(&mut self) -> RelayResult<&UploadSession> {
        if self.state != UploadState::Idle {
            return Err(self.out_of_sequence("initiate"));
        }

        match self.backend.create_multipart(&self.bucket, &self.key).await {
            Ok(upload_id) => {
                let session = UploadSession {
                    bucket: self.bucket.clone(),
                    key: self.key.clone(),
                    upload_id,
                };
                info!(
                    backend = self.backend.name(),
                    session = %session,
                    "Multipart upload initiated"
                );
                self.state = UploadState::SessionOpen;
                Ok(self.session.insert(session))
            }
            Err(e) => {
                self.state = UploadState::Failed;
                Err(RelayError::UploadInitFailed(e))
            }
        }
    }

    /// Append a chunk; uploads the buffer as the next part once it reaches the
    /// part size.
    pub async fn ingest(&mut self, chunk: &[u8]) -> RelayResult<()> {
        if !matches!(
            self.state,
            UploadState::SessionOpen | UploadState::Buffering
        ) {
            return Err(self.out_of_sequence("ingest"));
        }

        self.state = UploadState::Buffering;
        self.buffer.push(chunk);

        if self.buffer.is_ready() {
            let body = self.buffer.take();
            let part_number = self.next_part_number();
            self.upload_part(body, part_number).await?;
        }
        Ok(())
    }

    /// Upload `body` as part `part_number`.
    ///
    /// `part_number` must be the next number in sequence. Retries (when
    /// configured) reuse the same number.
    pub async fn upload_part(&mut self, body: Bytes, part_number: i32) -> RelayResult<&PartRecord> {
        if self.session.is_none() {
            return Err(self.out_of_sequence("upload_part"));
        }
        let expected = self.next_part_number();
        if part_number != expected {
            return Err(RelayError::Unexpected(format!(
                "part {} uploaded out of sequence, expected {}",
                part_number, expected
            )));
        }

        if part_number > MAX_PART_NUMBER {
            return Err(RelayError::TooManyParts {
                limit: MAX_PART_NUMBER,
            });
        }

        let previous = self.state;
        self.state = UploadState::PartUploading;

        let etag = self.send_part(&body, part_number).await?;

        let record = PartRecord {
            part_number,
            etag,
            size: body.len(),
        };
        self.bytes_uploaded += body.len() as u64;
        info!(
            part_number,
            size = record.size,
            total_bytes = self.bytes_uploaded,
            "Part uploaded"
        );

        if previous != UploadState::FinalFlush {
            self.state = UploadState::Buffering;
        } else {
            self.state = previous;
        }
        self.parts.push(record);
        Ok(&self.parts[self.parts.len() - 1])
    }

    async fn send_part(&self, body: &Bytes, part_number: i32) -> RelayResult<String> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.out_of_sequence("upload_part"));
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .backend
                .upload_part(session, part_number, body.clone())
                .await
            {
                Ok(etag) => return Ok(etag),
                Err(e) if attempt < self.max_part_attempts => {
                    warn!(
                        part_number,
                        attempt,
                        max_attempts = self.max_part_attempts,
                        error = %e,
                        "Part upload failed, retrying"
                    );
                    let delay = retry_delay(self.retry_base_delay, attempt);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(RelayError::PartUploadFailed {
                        part_number,
                        source: e,
                    })
                }
            }
        }
    }

    /// Flush the remaining buffer and commit the upload.
    ///
    /// A non-empty buffer becomes the last part. If no part was uploaded at all
    /// (empty source), a single empty part is uploaded so the completion call
    /// always lists at least one part.
    pub async fn finalize(&mut self) -> RelayResult<ObjectReference> {
        if !matches!(
            self.state,
            UploadState::SessionOpen | UploadState::Buffering
        ) {
            return Err(self.out_of_sequence("finalize"));
        }

        self.state = UploadState::FinalFlush;
        if !self.buffer.is_empty() || self.parts.is_empty() {
            let body = self.buffer.take();
            let part_number = self.next_part_number();
            debug!(part_number, size = body.len(), "Flushing final part");
            self.upload_part(body, part_number).await?;
        }

        self.state = UploadState::Completing;
        let Some(session) = self.session.as_ref() else {
            return Err(self.out_of_sequence("finalize"));
        };
        let etag = self
            .backend
            .complete_multipart(session, &self.parts)
            .await
            .map_err(RelayError::CompletionFailed)?;

        self.session = None;
        self.state = UploadState::Committed;

        let reference = ObjectReference {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            etag,
            size: self.bytes_uploaded,
            parts: self.parts.len(),
        };
        info!(object = %reference, "Multipart upload committed");
        Ok(reference)
    }

    /// Cancel the open session, if any.
    ///
    /// Best-effort: a failed abort is logged and otherwise ignored so it never
    /// hides the error that caused it.
    pub async fn abort(&mut self) {
        if self.state.is_terminal() && self.session.is_none() {
            return;
        }

        self.state = UploadState::Aborting;
        if let Some(session) = self.session.take() {
            warn!(session = %session, parts = self.parts.len(), "Aborting multipart upload");
            if let Err(e) = self.backend.abort_multipart(&session).await {
                warn!(
                    session = %session,
                    error = %e,
                    "Failed to abort multipart upload, orphaned parts may remain"
                );
            }
        }
        self.state = UploadState::Failed;
    }

    fn next_part_number(&self) -> i32 {
        self.parts.len() as i32 + 1
    }

    fn out_of_sequence(&self, operation: &str) -> RelayError {
        RelayError::Unexpected(format!(
            "{} called while upload is {:?}",
            operation, self.state
        ))
    }
}

/// Delay before the retry that follows failed attempt `attempt` (1-based):
/// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

impl Drop for UploadDriver {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(session = %session, "Upload abandoned, aborting in background");
                let backend = Arc::clone(&self.backend);
                handle.spawn(async move {
                    if let Err(e) = backend.abort_multipart(&session).await {
                        warn!(session = %session, error = %e, "Background abort failed");
                    }
                });
            }
            Err(_) => {
                warn!(session = %session, "Upload abandoned without a runtime, session left open");
            }
        }
    }
}
