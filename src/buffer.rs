//! Bounded response buffering

/// Fixed-capacity byte sink for command output.
///
/// The buffer is a hard cap, not a growable one: [`write_up_to`] accepts at
/// most the remaining room and silently drops the rest. It is owned by the
/// connection and cleared at the start of each command, so a single
/// allocation is reused for the lifetime of the connection.
///
/// [`write_up_to`]: ResponseBuffer::write_up_to
#[derive(Debug)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl ResponseBuffer {
    /// Create a buffer that accepts at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Discard buffered contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append as much of `chunk` as fits, returning the number of bytes
    /// accepted. Bytes beyond capacity are dropped, not an error.
    pub fn write_up_to(&mut self, chunk: &[u8]) -> usize {
        let room = self.capacity - self.data.len();
        let take = chunk.len().min(room);
        self.data.extend_from_slice(&chunk[..take]);
        take
    }

    /// True once the buffer has reached capacity.
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Buffered contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
