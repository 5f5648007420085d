//! Pixel buffer reuse and memory accounting.
//!
//! Conversions allocate several full-frame buffers. [`BufferPool`] keeps a
//! few released allocations around for the next job and tracks how many
//! bytes the running pipeline has leased, which is what [`MemoryMonitor`]
//! reports to the optimizer.

use parking_lot::Mutex;
use pixel_engine::PixelBuffer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Released buffers kept for reuse by default
pub const DEFAULT_MAX_RETAINED: usize = 4;

#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    in_use: AtomicU64,
    peak: AtomicU64,
}

impl BufferPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
            in_use: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    /// Account for `bytes` of working memory until the lease is dropped.
    pub fn lease(self: &Arc<Self>, bytes: u64) -> MemoryLease {
        let now = self.in_use.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(now, Ordering::AcqRel);
        MemoryLease {
            pool: Arc::clone(self),
            bytes,
        }
    }

    /// An empty vector with at least `capacity` bytes reserved, reusing a
    /// released allocation when one is large enough.
    pub fn take(&self, capacity: usize) -> Vec<u8> {
        let mut free = self.free.lock();
        let best = free
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= capacity)
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(i, _)| i);

        match best {
            Some(i) => {
                let mut buf = free.swap_remove(i);
                buf.clear();
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    /// Hand an allocation back for reuse.
    pub fn recycle(&self, buf: Vec<u8>) {
        if buf.capacity() == 0 {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        } else if let Some(smallest) = free
            .iter_mut()
            .min_by_key(|b| b.capacity())
            .filter(|b| b.capacity() < buf.capacity())
        {
            *smallest = buf;
        }
    }

    /// Recycle an intermediate image if nothing else references it.
    pub fn recycle_pixels(&self, pixels: Arc<PixelBuffer>) {
        if let Ok(pixels) = Arc::try_unwrap(pixels) {
            self.recycle(pixels.into_raw());
        }
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }

    pub fn retained_bytes(&self) -> usize {
        self.free.lock().iter().map(Vec::capacity).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETAINED)
    }
}

/// Accounted working memory, released on drop
#[derive(Debug)]
pub struct MemoryLease {
    pool: Arc<BufferPool>,
    bytes: u64,
}

impl MemoryLease {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Reports leased memory against a budget
#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    pool: Arc<BufferPool>,
}

impl MemoryMonitor {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    /// Fraction of `budget` currently leased. A zero budget is always full.
    pub fn usage_ratio(&self, budget: u64) -> f64 {
        if budget == 0 {
            return 1.0;
        }
        self.pool.in_use_bytes() as f64 / budget as f64
    }

    /// Fraction of `budget` that would be leased after taking `extra` more
    /// bytes.
    pub fn projected_ratio(&self, budget: u64, extra: u64) -> f64 {
        if budget == 0 {
            return 1.0;
        }
        self.pool.in_use_bytes().saturating_add(extra) as f64 / budget as f64
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.pool.in_use_bytes()
    }
}
