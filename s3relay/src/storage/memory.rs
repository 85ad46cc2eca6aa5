//! In-process multipart backend.
//!
//! `MemoryBackend` keeps uploads and committed objects in memory and enforces
//! the same completion rules S3 does: parts listed in ascending order, every
//! listed part present with a matching ETag, and every part except the last at
//! least the minimum part size. It backs the CLI's `--dry-run` mode and the
//! test suite.
//!
//! Failures can be injected per operation with [`MemoryBackend::inject_fault`];
//! each injected fault fires once.

use std::collections::{BTreeMap, HashMap, HashSet};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::error::StorageError;
use super::traits::{
    BoxFuture, MultipartBackend, PartRecord, UploadSession, MAX_PART_NUMBER, MIN_PART_SIZE,
};

/// Operation a fault can be injected into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    /// Session creation.
    Create,
    /// Upload of the given part number.
    UploadPart(i32),
    /// Completion.
    Complete,
    /// Abort.
    Abort,
}

/// Record of a call made against the backend, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateMultipart { bucket: String, key: String },
    UploadPart { part_number: i32, size: usize },
    CompleteMultipart { part_numbers: Vec<i32> },
    AbortMultipart { upload_id: String },
}

/// A committed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object contents.
    pub data: Bytes,
    /// Multipart-style ETag (`<digest>-<part count>`).
    pub etag: String,
    /// Size of each part, in part order.
    pub part_sizes: Vec<usize>,
}

struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Default)]
struct MemoryState {
    buckets: HashSet<String>,
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<(String, String), StoredObject>,
    faults: Vec<(BackendOp, StorageError)>,
    calls: Vec<BackendCall>,
    next_upload: u64,
}

impl MemoryState {
    fn take_fault(&mut self, op: &BackendOp) -> Option<StorageError> {
        let index = self.faults.iter().position(|(o, _)| o == op)?;
        Some(self.faults.remove(index).1)
    }
}

/// In-memory multipart backend.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    min_part_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MIN_PART_SIZE)
    }
}

impl MemoryBackend {
    /// Create a backend that rejects non-final parts below `min_part_size`.
    pub fn new(min_part_size: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            min_part_size,
        }
    }

    /// Register a bucket (builder style).
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.add_bucket(bucket);
        self
    }

    /// Register a bucket.
    pub fn add_bucket(&self, bucket: impl Into<String>) {
        self.state.lock().buckets.insert(bucket.into());
    }

    /// Make the next call of `op` fail with `error`.
    pub fn inject_fault(&self, op: BackendOp, error: StorageError) {
        self.state.lock().faults.push((op, error));
    }

    /// Get a committed object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Number of sessions neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    fn validate_parts(
        &self,
        upload: &PendingUpload,
        parts: &[PartRecord],
    ) -> Result<(), StorageError> {
        if parts.is_empty() {
            return Err(StorageError::from_code(
                "MalformedXML",
                "the part list must contain at least one part",
            ));
        }

        let mut previous = 0;
        for (index, part) in parts.iter().enumerate() {
            if part.part_number <= previous {
                return Err(StorageError::from_code(
                    "InvalidPartOrder",
                    format!("part {} listed after part {}", part.part_number, previous),
                ));
            }
            previous = part.part_number;

            let (etag, data) = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::from_code(
                    "InvalidPart",
                    format!("part {} was never uploaded", part.part_number),
                )
            })?;
            if *etag != part.etag {
                return Err(StorageError::from_code(
                    "InvalidPart",
                    format!("ETag mismatch for part {}", part.part_number),
                ));
            }

            let is_last = index + 1 == parts.len();
            if !is_last && data.len() < self.min_part_size {
                return Err(StorageError::from_code(
                    "EntityTooSmall",
                    format!(
                        "part {} is {} bytes, minimum is {}",
                        part.part_number,
                        data.len(),
                        self.min_part_size
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Quoted hex digest used as an ETag.
fn digest_etag(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    format!("\"{}\"", hex)
}

fn no_such_upload(upload_id: &str) -> StorageError {
    StorageError::from_code(
        "NoSuchUpload",
        format!("upload {} does not exist", upload_id),
    )
}

impl MultipartBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::CreateMultipart {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });

            if let Some(fault) = state.take_fault(&BackendOp::Create) {
                return Err(fault);
            }
            if !state.buckets.contains(bucket) {
                return Err(StorageError::from_code(
                    "NoSuchBucket",
                    format!("bucket {} does not exist", bucket),
                ));
            }

            state.next_upload += 1;
            let upload_id = format!("mem-upload-{}", state.next_upload);
            state.uploads.insert(
                upload_id.clone(),
                PendingUpload {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    parts: BTreeMap::new(),
                },
            );
            Ok(upload_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        session: &'a UploadSession,
        part_number: i32,
        body: Bytes,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::UploadPart {
                part_number,
                size: body.len(),
            });

            if let Some(fault) = state.take_fault(&BackendOp::UploadPart(part_number)) {
                return Err(fault);
            }
            if !(1..=MAX_PART_NUMBER).contains(&part_number) {
                return Err(StorageError::from_code(
                    "InvalidArgument",
                    format!("part number {} out of range", part_number),
                ));
            }

            let upload = state
                .uploads
                .get_mut(&session.upload_id)
                .ok_or_else(|| no_such_upload(&session.upload_id))?;
            let etag = digest_etag(&body);
            upload.parts.insert(part_number, (etag.clone(), body));
            Ok(etag)
        })
    }

    fn complete_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
        parts: &'a [PartRecord],
    ) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::CompleteMultipart {
                part_numbers: parts.iter().map(|p| p.part_number).collect(),
            });

            if let Some(fault) = state.take_fault(&BackendOp::Complete) {
                return Err(fault);
            }

            let upload = state
                .uploads
                .get(&session.upload_id)
                .ok_or_else(|| no_such_upload(&session.upload_id))?;
            self.validate_parts(upload, parts)?;

            let mut data = BytesMut::new();
            let mut part_sizes = Vec::with_capacity(parts.len());
            for part in parts {
                if let Some((_, bytes)) = upload.parts.get(&part.part_number) {
                    data.extend_from_slice(bytes);
                    part_sizes.push(bytes.len());
                }
            }
            let data = data.freeze();
            let etag = format!(
                "{}-{}\"",
                digest_etag(&data).trim_end_matches('"'),
                parts.len()
            );

            if let Some(upload) = state.uploads.remove(&session.upload_id) {
                state.objects.insert(
                    (upload.bucket, upload.key),
                    StoredObject {
                        data,
                        etag: etag.clone(),
                        part_sizes,
                    },
                );
            }
            Ok(Some(etag))
        })
    }

    fn abort_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.calls.push(BackendCall::AbortMultipart {
                upload_id: session.upload_id.clone(),
            });

            if let Some(fault) = state.take_fault(&BackendOp::Abort) {
                return Err(fault);
            }
            state
                .uploads
                .remove(&session.upload_id)
                .map(|_| ())
                .ok_or_else(|| no_such_upload(&session.upload_id))
        })
    }
}
