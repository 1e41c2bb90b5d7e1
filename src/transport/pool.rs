use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::config::ClientConfig;

/// Reusable outbound message buffers, owned by one connection.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    initial_capacity: usize,
    max_retained_capacity: usize,
}

impl BufferPool {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(config.buffer_pool_size)),
            max_pooled: config.buffer_pool_size,
            initial_capacity: config.buffer_capacity,
            max_retained_capacity: config.max_retained_capacity,
        }
    }

    /// Checks out an empty buffer. It goes back to the pool when the guard
    /// drops, on every exit path.
    pub fn checkout(&self) -> PooledBuf<'_> {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));
        PooledBuf { pool: self, buf }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_retained_capacity {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }
}

pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
