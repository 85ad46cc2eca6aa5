//! Part accumulation buffer.

use bytes::{Bytes, BytesMut};

/// Owned, resettable buffer that collects chunks until they form a part.
///
/// # Invariants
///
/// - `take()` always leaves the buffer empty, so the next chunk starts a new
///   part.
/// - The driver only takes the buffer early (below the threshold) for the final
///   part at end-of-stream.
#[derive(Debug)]
pub struct PartBuffer {
    data: BytesMut,
    threshold: usize,
}

impl PartBuffer {
    /// Create a buffer that becomes ready at `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            data: BytesMut::with_capacity(threshold),
            threshold,
        }
    }

    /// Append a chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Returns true once the buffer holds at least `threshold` bytes.
    pub fn is_ready(&self) -> bool {
        self.data.len() >= self.threshold
    }

    /// Hand out the buffered bytes and reset to empty.
    pub fn take(&mut self) -> Bytes {
        let part = self.data.split().freeze();
        self.data.reserve(self.threshold);
        part
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_at_threshold() {
        let mut buffer = PartBuffer::new(4);
        buffer.push(b"abc");
        assert!(!buffer.is_ready());
        buffer.push(b"d");
        assert!(buffer.is_ready());
    }

    #[test]
    fn test_take_resets_buffer() {
        let mut buffer = PartBuffer::new(4);
        buffer.push(b"abcdef");

        let part = buffer.take();

        assert_eq!(&part[..], b"abcdef");
        assert!(buffer.is_empty());
        assert!(!buffer.is_ready());

        buffer.push(b"gh");
        assert_eq!(&buffer.take()[..], b"gh");
    }

    #[test]
    fn test_take_on_empty_buffer() {
        let mut buffer = PartBuffer::new(4);
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let buffer = PartBuffer::new(0);
        assert_eq!(buffer.threshold(), 1);
    }
}
