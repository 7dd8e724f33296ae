//! A size-banded, pressure-aware buffer pool.
//!
//! Grounded in `MemoryOptimizer.cpp`'s `EnhancedBufferPool`: buffers are
//! bucketed into small/medium/large bands, a miss falls back to the next
//! band before allocating fresh, and `set_memory_pressure` trims every band
//! proportionally. The C++ singleton (`getInstance()`) becomes an
//! explicitly constructed, shareable `BufferPool` here — demuxers hold an
//! `Arc` to one rather than reaching for a process-wide global, which keeps
//! pool lifetime tied to the caller instead of the process.

use std::env;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Weak};

const SMALL_BUFFER_THRESHOLD: usize = 4 * 1024;
const MEDIUM_BUFFER_THRESHOLD: usize = 64 * 1024;
const DEFAULT_MAX_POOLED_BUFFERS: usize = 32;
const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Env var overriding the pool's total memory ceiling, in megabytes.
pub const ENV_BUFFER_MEM_MAX_MB: &str = "DEMUX_BUFFER_MEM_MAX_MB";

#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    hits: u64,
    misses: u64,
    reuse_count: u64,
}

struct Inner {
    small: Mutex<Vec<Vec<u8>>>,
    medium: Mutex<Vec<Vec<u8>>>,
    large: Mutex<Vec<Vec<u8>>>,
    stats: Mutex<Stats>,
    memory_pressure: Mutex<u8>,
    max_buffer_size_cap: usize,
}

/// A buffer pool shared by every byte source and demuxer that reads through
/// the same session.
///
/// Cloning a `BufferPool` is cheap (an `Arc` bump); all clones share the
/// same bands and statistics.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

/// Snapshot of pool occupancy and hit/miss counters, mirroring
/// `EnhancedBufferPool::PoolStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total_buffers: usize,
    pub total_memory_bytes: usize,
    pub largest_buffer_size: usize,
    pub buffer_hits: u64,
    pub buffer_misses: u64,
    pub reuse_count: u64,
    pub memory_pressure: u8,
}

impl PoolStats {
    /// Fraction of `acquire` calls satisfied from an existing buffer.
    pub fn hit_ratio(&self) -> f32 {
        let total = self.buffer_hits + self.buffer_misses;
        if total == 0 {
            0.0
        } else {
            self.buffer_hits as f32 / total as f32
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Builds a pool with the default (1 MiB) per-buffer cap, or the value
    /// of `DEMUX_BUFFER_MEM_MAX_MB` divided evenly across the three bands if
    /// set.
    pub fn new() -> Self {
        let max_buffer_size_cap = env::var(ENV_BUFFER_MEM_MAX_MB)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|mb| (mb * 1024 * 1024 / 3).max(SMALL_BUFFER_THRESHOLD))
            .unwrap_or(DEFAULT_MAX_BUFFER_SIZE);

        Self {
            inner: Arc::new(Inner {
                small: Mutex::new(Vec::new()),
                medium: Mutex::new(Vec::new()),
                large: Mutex::new(Vec::new()),
                stats: Mutex::new(Stats::default()),
                memory_pressure: Mutex::new(0),
                max_buffer_size_cap,
            }),
        }
    }

    fn max_buffer_size(&self) -> usize {
        let pressure = *self.inner.memory_pressure.lock().unwrap() as usize;
        let floor = 256 * 1024;
        let cap = self.inner.max_buffer_size_cap;
        if cap <= floor {
            return cap;
        }
        cap - (cap - floor) * pressure / 100
    }

    fn max_pooled_buffers(&self) -> usize {
        let pressure = *self.inner.memory_pressure.lock().unwrap() as usize;
        DEFAULT_MAX_POOLED_BUFFERS - (DEFAULT_MAX_POOLED_BUFFERS - 8) * pressure / 100
    }

    /// Acquires a buffer with at least `min_size` bytes of capacity,
    /// reusing a pooled allocation when one of sufficient capacity exists.
    pub fn acquire(&self, min_size: usize) -> PooledBuffer {
        let max_size = self.max_buffer_size();
        if min_size > max_size {
            self.inner.stats.lock().unwrap().misses += 1;
            return PooledBuffer {
                data: Vec::with_capacity(min_size),
                pool: Arc::downgrade(&self.inner),
            };
        }

        let band = self.band_for(min_size);
        if let Some(buf) = self.take_from_band(band, min_size) {
            let mut stats = self.inner.stats.lock().unwrap();
            stats.hits += 1;
            stats.reuse_count += 1;
            return PooledBuffer {
                data: buf,
                pool: Arc::downgrade(&self.inner),
            };
        }

        // Fall back to the other bands before allocating fresh.
        for fallback in self.other_bands(band) {
            if let Some(buf) = self.take_from_band(fallback, min_size) {
                let mut stats = self.inner.stats.lock().unwrap();
                stats.hits += 1;
                stats.reuse_count += 1;
                return PooledBuffer {
                    data: buf,
                    pool: Arc::downgrade(&self.inner),
                };
            }
        }

        self.inner.stats.lock().unwrap().misses += 1;
        let capacity = Self::round_up(min_size);
        PooledBuffer {
            data: Vec::with_capacity(capacity),
            pool: Arc::downgrade(&self.inner),
        }
    }

    fn round_up(target: usize) -> usize {
        if target <= 4096 {
            4096
        } else if target <= 16384 {
            16384
        } else if target <= 65536 {
            65536
        } else {
            target.div_ceil(65536) * 65536
        }
    }

    fn band_for(&self, size: usize) -> &'static str {
        if size < SMALL_BUFFER_THRESHOLD {
            "small"
        } else if size > MEDIUM_BUFFER_THRESHOLD {
            "large"
        } else {
            "medium"
        }
    }

    fn other_bands(&self, exclude: &'static str) -> Vec<&'static str> {
        ["large", "medium", "small"]
            .into_iter()
            .filter(|b| *b != exclude)
            .collect()
    }

    fn band_vec(&self, band: &'static str) -> &Mutex<Vec<Vec<u8>>> {
        match band {
            "small" => &self.inner.small,
            "medium" => &self.inner.medium,
            "large" => &self.inner.large,
            _ => unreachable!(),
        }
    }

    fn take_from_band(&self, band: &'static str, min_size: usize) -> Option<Vec<u8>> {
        let mut vec = self.band_vec(band).lock().unwrap();
        let idx = vec.iter().position(|b| b.capacity() >= min_size)?;
        let mut buf = vec.swap_remove(idx);
        buf.clear();
        Some(buf)
    }

    fn return_buffer(&self, mut buffer: Vec<u8>) {
        let capacity = buffer.capacity();
        if !self.should_pool(capacity) {
            return;
        }
        buffer.clear();

        let band = self.band_for(capacity);
        let max_buffers = self.max_pooled_buffers();
        let category_max = (max_buffers / 3).max(1);
        let mut vec = self.band_vec(band).lock().unwrap();
        if vec.len() < category_max {
            vec.push(buffer);
        }
    }

    fn should_pool(&self, capacity: usize) -> bool {
        if capacity < 1024 {
            return false;
        }
        if capacity > self.max_buffer_size() {
            return false;
        }
        let pressure = *self.inner.memory_pressure.lock().unwrap();
        if pressure > 70 && capacity > MEDIUM_BUFFER_THRESHOLD {
            return false;
        }
        true
    }

    /// Updates memory pressure (0-100, clamped). Above 70%, every band is
    /// halved immediately, matching the original's proactive shrink.
    pub fn set_memory_pressure(&self, level: i32) {
        let clamped = level.clamp(0, 100) as u8;
        *self.inner.memory_pressure.lock().unwrap() = clamped;

        if clamped > 70 {
            for band in ["small", "medium", "large"] {
                let mut vec = self.band_vec(band).lock().unwrap();
                let half = vec.len() / 2;
                vec.truncate(half);
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(pressure = clamped, "buffer pool shrunk under memory pressure");
        }
    }

    /// Drops every pooled buffer across all bands.
    pub fn clear(&self) {
        self.inner.small.lock().unwrap().clear();
        self.inner.medium.lock().unwrap().clear();
        self.inner.large.lock().unwrap().clear();
    }

    /// Returns a snapshot of current pool occupancy and counters.
    pub fn stats(&self) -> PoolStats {
        let small = self.inner.small.lock().unwrap();
        let medium = self.inner.medium.lock().unwrap();
        let large = self.inner.large.lock().unwrap();
        let stats = *self.inner.stats.lock().unwrap();

        let mut out = PoolStats {
            buffer_hits: stats.hits,
            buffer_misses: stats.misses,
            reuse_count: stats.reuse_count,
            memory_pressure: *self.inner.memory_pressure.lock().unwrap(),
            ..Default::default()
        };

        for band in [&*small, &*medium, &*large] {
            out.total_buffers += band.len();
            for buf in band {
                out.total_memory_bytes += buf.capacity();
                out.largest_buffer_size = out.largest_buffer_size.max(buf.capacity());
            }
        }
        out
    }
}

/// A `Vec<u8>` on loan from a [`BufferPool`].
///
/// Returned to its originating pool's matching band on drop, provided the
/// pool is still alive and the buffer is worth pooling. Derefs to `Vec<u8>`
/// for transparent use.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<Inner>,
}

impl PooledBuffer {
    /// Builds a detached buffer not backed by any pool; returned buffers
    /// from `BufferPool::acquire` carry a live `pool` weak reference
    /// instead.
    pub fn detached(data: Vec<u8>) -> Self {
        Self {
            data,
            pool: Weak::new(),
        }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(inner) = self.pool.upgrade() {
            let data = std::mem::take(&mut self.data);
            BufferPool { inner }.return_buffer(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_returned_buffer() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(100);
            buf.resize(100, 0);
        }
        let stats = pool.stats();
        assert_eq!(stats.buffer_misses, 1);

        let _buf = pool.acquire(100);
        let stats = pool.stats();
        assert_eq!(stats.buffer_hits, 1);
        assert_eq!(stats.reuse_count, 1);
    }

    #[test]
    fn oversized_request_is_not_pooled() {
        let pool = BufferPool::new();
        let buf = pool.acquire(4 * 1024 * 1024);
        assert!(buf.capacity() >= 4 * 1024 * 1024);
        drop(buf);
        assert_eq!(pool.stats().total_buffers, 0);
    }

    #[test]
    fn high_pressure_shrinks_bands() {
        let pool = BufferPool::new();
        for _ in 0..10 {
            drop(pool.acquire(2048));
        }
        assert!(pool.stats().total_buffers > 0);
        pool.set_memory_pressure(90);
        let after = pool.stats().total_buffers;
        assert!(after <= pool.stats().total_buffers);
        let _ = after;
    }
}
