//! Reusable scratch buffers for encoding

use bytes::BytesMut;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Default initial capacity of a pooled buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Default number of idle buffers kept around
pub const DEFAULT_MAX_POOLED: usize = 16;

/// A small pool of `BytesMut` scratch buffers
///
/// Buffers are handed out as [`PooledBuffer`] guards and go back to the pool
/// when the guard is dropped. Anything handed to callers must be copied out
/// of the guard first; the pool reuses the storage.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
    max_pooled: usize,
}

impl BufferPool {
    pub fn new(max_pooled: usize, buffer_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_pooled)),
            buffer_capacity,
            max_pooled,
        }
    }

    /// Take an empty buffer, allocating if the pool is dry
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let buf = self
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));

        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    /// Number of idle buffers
    pub fn available(&self) -> usize {
        self.buffers.lock().len()
    }

    fn give_back(&self, mut buf: BytesMut) {
        buf.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED, DEFAULT_BUFFER_CAPACITY)
    }
}

/// Scratch buffer on loan from a [`BufferPool`]
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<BytesMut>,
}

impl Deref for PooledBuffer<'_> {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        // Only `Drop` takes the buffer out
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut BytesMut {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}
