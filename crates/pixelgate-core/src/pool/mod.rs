//! Bitmap pool - reuse of released pixel buffers.
//!
//! Decoding into a previously released buffer avoids allocating a fresh
//! region for every request, which matters when a scrolling list decodes
//! dozens of same-sized thumbnails per second.
//!
//! # Layout
//!
//! Free buffers are grouped into buckets keyed by capacity class, the
//! capacity rounded up to a power of two. Compatibility is purely a matter of
//! bytes: a buffer last used for one layout can be reused for any other it is
//! large enough for. Each bucket has its own lock, so concurrent decoders only contend when they
//! touch the same bucket. The bucket map itself sits behind a read-write lock
//! that is only taken for writing when a new bucket is created.
//!
//! # Eviction
//!
//! The pool holds at most `max_bytes`. When a release pushes it over that
//! budget, buffers are dropped oldest-release first until it fits again.
//! A pool miss never blocks: the caller allocates a fresh buffer instead.

mod buffer;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

pub use buffer::{BufferId, PixelBuffer, PixelFormat};

/// A pooled buffer's capacity class may be at most this multiple of the
/// request's class before it is considered too wasteful to hand out.
const MAX_SIZE_MULTIPLE: usize = 8;

/// Default pool budget in bytes.
pub const DEFAULT_POOL_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Buffers currently held by the pool.
    pub buffers: usize,
    /// Bytes currently held by the pool.
    pub held_bytes: usize,
    /// Budget in bytes.
    pub max_bytes: usize,
    /// Borrows served from the pool.
    pub hits: u64,
    /// Borrows that found no compatible buffer.
    pub misses: u64,
    /// Buffers dropped by LRU trimming or explicit eviction.
    pub evictions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BucketKey {
    capacity_class: usize,
}

impl BucketKey {
    fn for_buffer(buffer: &PixelBuffer) -> Self {
        Self {
            capacity_class: capacity_class(buffer.capacity()).unwrap_or(usize::MAX),
        }
    }
}

/// `bytes` rounded up to a power of two, `None` if that overflows.
fn capacity_class(bytes: usize) -> Option<usize> {
    bytes.checked_next_power_of_two()
}

#[derive(Debug)]
struct Entry {
    released_at: u64,
    buffer: PixelBuffer,
}

/// Free buffers of one bucket, oldest release at the front.
#[derive(Debug, Default)]
struct Bucket {
    entries: VecDeque<Entry>,
}

/// Thread-safe pool of reusable pixel buffers.
pub struct BufferPool {
    buckets: RwLock<BTreeMap<BucketKey, Arc<Mutex<Bucket>>>>,
    max_bytes: usize,
    held_bytes: AtomicUsize,
    buffer_count: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BufferPool {
    /// Create a pool that holds at most `max_bytes` of free buffers.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            max_bytes,
            held_bytes: AtomicUsize::new(0),
            buffer_count: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Borrow a buffer able to hold a `width` x `height` bitmap in `format`.
    ///
    /// Buckets are searched smallest class first. Within a bucket a buffer
    /// last used for `format` is preferred, then any buffer with enough
    /// bytes. The returned buffer is retagged to `format` and no longer
    /// belongs to the pool. Returns `None` on a miss, including sizes whose
    /// byte count overflows; the caller is expected to allocate.
    pub fn try_borrow(&self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        let Some(required) = format.checked_byte_count(width, height).filter(|&n| n > 0) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        for bucket in self.candidate_buckets(required) {
            let mut bucket = bucket.lock();
            // Most recently released first: its memory is the likeliest to be warm.
            let fits = |entry: &Entry| entry.buffer.capacity() >= required;
            let position = bucket
                .entries
                .iter()
                .rposition(|entry| fits(entry) && entry.buffer.format() == format)
                .or_else(|| bucket.entries.iter().rposition(fits));
            if let Some(position) = position {
                if let Some(entry) = bucket.entries.remove(position) {
                    drop(bucket);
                    let mut buffer = entry.buffer;
                    self.held_bytes.fetch_sub(buffer.capacity(), Ordering::AcqRel);
                    self.buffer_count.fetch_sub(1, Ordering::AcqRel);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    buffer.reconfigure(format);
                    debug!(
                        id = buffer.id().get(),
                        capacity = buffer.capacity(),
                        width,
                        height,
                        ?format,
                        "Borrowed buffer from pool"
                    );
                    return Some(buffer);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Return a buffer to the pool for future reuse.
    ///
    /// Buffers that are empty or larger than the whole budget are dropped.
    /// Returns whether the buffer was pooled.
    pub fn release(&self, buffer: PixelBuffer) -> bool {
        let capacity = buffer.capacity();
        if capacity == 0 || capacity > self.max_bytes {
            debug!(
                id = buffer.id().get(),
                capacity,
                max_bytes = self.max_bytes,
                "Discarding buffer that cannot be pooled"
            );
            return false;
        }

        let key = BucketKey::for_buffer(&buffer);
        let bucket = self.bucket_for(key);
        {
            let mut bucket = bucket.lock();
            // Stamped and counted under the bucket lock so each bucket stays
            // ordered and a concurrent borrow never subtracts first.
            let released_at = self.clock.fetch_add(1, Ordering::AcqRel);
            self.held_bytes.fetch_add(capacity, Ordering::AcqRel);
            self.buffer_count.fetch_add(1, Ordering::AcqRel);
            bucket.entries.push_back(Entry {
                released_at,
                buffer,
            });
        }

        self.trim_to(self.max_bytes);
        true
    }

    /// Permanently discard a buffer that must not be offered again.
    pub fn evict(&self, buffer: PixelBuffer) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        warn!(
            id = buffer.id().get(),
            capacity = buffer.capacity(),
            format = ?buffer.format(),
            "Evicting buffer from pool"
        );
    }

    /// Drop a pooled buffer by identity.
    ///
    /// Returns `false` if the pool does not hold it, which makes repeated
    /// eviction of the same buffer a no-op.
    pub fn evict_by_id(&self, id: BufferId) -> bool {
        let buckets: Vec<_> = self.buckets.read().values().cloned().collect();
        for bucket in buckets {
            let mut bucket = bucket.lock();
            if let Some(position) = bucket.entries.iter().position(|e| e.buffer.id() == id) {
                if let Some(entry) = bucket.entries.remove(position) {
                    drop(bucket);
                    self.forget(&entry.buffer);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(id = id.get(), "Evicted pooled buffer by id");
                    return true;
                }
            }
        }
        false
    }

    /// Whether the pool currently holds the buffer with this identity.
    pub fn contains(&self, id: BufferId) -> bool {
        self.buckets
            .read()
            .values()
            .any(|bucket| bucket.lock().entries.iter().any(|e| e.buffer.id() == id))
    }

    /// Drop least-recently-released buffers until at most `limit` bytes remain.
    pub fn trim_to(&self, limit: usize) {
        while self.held_bytes.load(Ordering::Acquire) > limit {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    /// Drop every pooled buffer.
    pub fn clear(&self) {
        self.trim_to(0);
    }

    /// Number of buffers currently pooled.
    pub fn len(&self) -> usize {
        self.buffer_count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            buffers: self.len(),
            held_bytes: self.held_bytes.load(Ordering::Acquire),
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Buckets that may hold a buffer for `required` bytes, in ascending
    /// capacity class.
    fn candidate_buckets(&self, required: usize) -> Vec<Arc<Mutex<Bucket>>> {
        let Some(min_class) = capacity_class(required) else {
            return Vec::new();
        };
        let max_class = min_class.saturating_mul(MAX_SIZE_MULTIPLE);
        let min_key = BucketKey {
            capacity_class: min_class,
        };
        let max_key = BucketKey {
            capacity_class: max_class,
        };

        self.buckets
            .read()
            .range(min_key..=max_key)
            .map(|(_, bucket)| Arc::clone(bucket))
            .collect()
    }

    fn bucket_for(&self, key: BucketKey) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().get(&key) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        Arc::clone(buckets.entry(key).or_default())
    }

    /// Drop the single least-recently-released buffer across all buckets.
    ///
    /// Returns `false` when the pool is empty.
    fn evict_oldest(&self) -> bool {
        let buckets: Vec<_> = self.buckets.read().values().cloned().collect();

        let oldest = buckets
            .iter()
            .filter_map(|bucket| {
                let stamp = bucket.lock().entries.front().map(|e| e.released_at)?;
                Some((stamp, bucket))
            })
            .min_by_key(|(stamp, _)| *stamp);

        let Some((stamp, bucket)) = oldest else {
            return false;
        };

        let mut bucket = bucket.lock();
        // The entry may have been borrowed since it was observed; the caller
        // loops on the byte count, so just try again in that case.
        if bucket.entries.front().map(|e| e.released_at) == Some(stamp) {
            if let Some(entry) = bucket.entries.pop_front() {
                drop(bucket);
                self.forget(&entry.buffer);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    id = entry.buffer.id().get(),
                    capacity = entry.buffer.capacity(),
                    "Trimmed least recently released buffer"
                );
            }
        }
        true
    }

    fn forget(&self, buffer: &PixelBuffer) {
        self.held_bytes.fetch_sub(buffer.capacity(), Ordering::AcqRel);
        self.buffer_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_MAX_BYTES)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffers", &self.len())
            .field("held_bytes", &self.held_bytes.load(Ordering::Relaxed))
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
