//! Bounded buffer pools.
//!
//! Fingerprinting and copying reuse fixed-size byte buffers instead of
//! allocating per file. Each pool hands out at most `max_outstanding`
//! buffers; the guard returns its buffer on drop, so take/return stays
//! balanced on every exit path including panics.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Result, SearchError};

pub const READ_BUF_SIZE: usize = 32 * 1024;
pub const MMAP_SCRATCH_SIZE: usize = 1024 * 1024;
pub const COPY_BUF_SIZE: usize = 128 * 1024;
pub const POOL_MAX_BUFFERS: usize = 32;

#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buf_size: usize,
    max_outstanding: usize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    pub fn new(buf_size: usize, max_outstanding: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            buf_size,
            max_outstanding,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Takes a zero-initialized buffer of the pool's size. Fails with
    /// `MemoryLimit` once `max_outstanding` buffers are in flight.
    pub fn take(&self) -> Result<PooledBuf<'_>> {
        let mut current = self.outstanding.load(Ordering::Relaxed);
        loop {
            if current >= self.max_outstanding {
                return Err(SearchError::MemoryLimit);
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let reused = self.free.lock().ok().and_then(|mut free| free.pop());
        let buf = reused.unwrap_or_else(|| vec![0u8; self.buf_size]);
        Ok(PooledBuf {
            pool: self,
            buf: Some(buf),
        })
    }

    /// Buffers currently checked out. Zero after every search terminates.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn put_back(&self, buf: Vec<u8>) {
        if buf.len() == self.buf_size {
            if let Ok(mut free) = self.free.lock() {
                free.push(buf);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// RAII handle on a pooled buffer.
#[derive(Debug)]
pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put_back(buf);
        }
    }
}

/// The per-search pool set: regular reads, mmap fallback scratch, copies.
#[derive(Debug)]
pub struct BufferPools {
    pub read: BufferPool,
    pub mmap_scratch: BufferPool,
    pub copy: BufferPool,
}

impl BufferPools {
    pub fn new() -> Self {
        Self {
            read: BufferPool::new(READ_BUF_SIZE, POOL_MAX_BUFFERS),
            mmap_scratch: BufferPool::new(MMAP_SCRATCH_SIZE, POOL_MAX_BUFFERS),
            copy: BufferPool::new(COPY_BUF_SIZE, POOL_MAX_BUFFERS),
        }
    }

    pub fn total_outstanding(&self) -> usize {
        self.read.outstanding() + self.mmap_scratch.outstanding() + self.copy.outstanding()
    }
}

impl Default for BufferPools {
    fn default() -> Self {
        Self::new()
    }
}
