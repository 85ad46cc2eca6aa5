//! Shared test fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use s3relay::relay::RelayError;
use s3relay::source::{rechunk, ChunkSource, ChunkStream};
use s3relay::storage::{BoxFuture, MemoryBackend, MultipartBackend};

pub const MIB: usize = 1024 * 1024;
pub const URL: &str = "https://source.test/data.csv";
pub const BUCKET: &str = "etl-bucket";
pub const KEY: &str = "source_folder/data.csv";

/// In-memory source that serves a fixed body in frames.
pub struct VecSource {
    body: Bytes,
    frame_size: usize,
    fail_after: Option<usize>,
    unavailable: Option<u16>,
    opened: AtomicBool,
}

impl VecSource {
    pub fn new(body: Vec<u8>, frame_size: usize) -> Self {
        Self {
            body: Bytes::from(body),
            frame_size,
            fail_after: None,
            unavailable: None,
            opened: AtomicBool::new(false),
        }
    }

    /// Body of `len` bytes with a recognisable pattern.
    pub fn patterned(len: usize, frame_size: usize) -> Self {
        Self::new(pattern(len), frame_size)
    }

    /// Break the connection once `bytes` bytes have been sent.
    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Answer every open with this HTTP status.
    pub fn unavailable(mut self, status: u16) -> Self {
        self.unavailable = Some(status);
        self
    }

    pub fn was_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ChunkSource for VecSource {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ChunkStream, RelayError>> {
        Box::pin(async move {
            self.opened.store(true, Ordering::SeqCst);
            if let Some(status) = self.unavailable {
                return Err(RelayError::SourceUnavailable {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                });
            }

            let limit = self.fail_after.unwrap_or(self.body.len()).min(self.body.len());
            let mut frames: Vec<Result<Bytes, String>> = Vec::new();
            let mut offset = 0;
            while offset < limit {
                let end = (offset + self.frame_size).min(limit);
                frames.push(Ok(self.body.slice(offset..end)));
                offset = end;
            }
            if self.fail_after.is_some() {
                frames.push(Err("connection reset by peer".to_string()));
            }

            Ok(rechunk(
                stream::iter(frames).boxed(),
                url.to_string(),
                self.frame_size,
            ))
        })
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::default().with_bucket(BUCKET))
}

pub fn as_dyn(backend: &Arc<MemoryBackend>) -> Arc<dyn MultipartBackend> {
    backend.clone()
}
