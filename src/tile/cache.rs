//! Bucketed tile cache.
//!
//! This module provides the store that memoizes tiles produced by expensive
//! upstream computation.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key:
//! - Tile origin X and Y (image space, at the tile's level)
//! - A context id separating sources that share one cache
//! - Resolution level
//!
//! # Buckets
//!
//! The key space is split into `bucket_count` LRU maps by a hash of the key.
//! Raster-scan access spreads evenly over the buckets, which bounds the
//! per-bucket bookkeeping without a spatial index.
//!
//! # Capacity
//!
//! By default the cache never evicts on its own: entries live until
//! `remove`, `invalidate` or `invalidate_all`. A byte capacity can be set
//! with [`TileCache::with_capacity`]; inserts then evict least-recently-used
//! entries, starting with the inserting key's bucket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{trace, warn};

use crate::error::PipelineError;
use crate::raster::PixelBuffer;

/// Default number of hash buckets.
pub const DEFAULT_BUCKET_COUNT: u32 = 10;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Tile origin X
    pub x: i64,

    /// Tile origin Y
    pub y: i64,

    /// Context id (distinguishes sources sharing a cache)
    pub z: i64,

    /// Resolution level (0 = full resolution)
    pub level: u32,
}

impl TileCacheKey {
    pub fn new(x: i64, y: i64, z: i64, level: u32) -> Self {
        Self { x, y, z, level }
    }

    /// Bucket this key lives in.
    fn bucket(&self, bucket_count: usize) -> usize {
        let mut h = (self.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= (self.y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        h ^= (self.z as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
        h ^= u64::from(self.level).wrapping_mul(0x27D4_EB2F_1656_67C5);
        // splitmix64 finalizer
        h ^= h >> 30;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 27;
        h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
        h ^= h >> 31;
        (h % bucket_count as u64) as usize
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub size_in_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheInner {
    buckets: Vec<LruCache<TileCacheKey, Arc<PixelBuffer>>>,

    /// Sum of `byte_size()` over every stored entry
    size_in_bytes: usize,
}

impl CacheInner {
    fn actual_size(&self) -> usize {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter())
            .map(|(_, tile)| tile.byte_size())
            .sum()
    }

    /// Drop the least-recently-used entry, preferring `preferred`'s bucket
    /// and never touching `keep`. Returns false when nothing can go.
    fn evict_one(&mut self, preferred: usize, keep: &TileCacheKey) -> bool {
        let order = std::iter::once(preferred).chain((0..self.buckets.len()).filter(|b| *b != preferred));
        for index in order {
            let bucket = &mut self.buckets[index];
            match bucket.peek_lru() {
                Some((key, _)) if key == keep => continue,
                Some(_) => {}
                None => continue,
            }
            if let Some((_, tile)) = bucket.pop_lru() {
                self.size_in_bytes = self.size_in_bytes.saturating_sub(tile.byte_size());
                return true;
            }
        }
        false
    }
}

/// Thread-safe, bucketed store of produced tiles.
///
/// Every operation takes one mutex, so size accounting is always
/// consistent across buckets. Entries are shared as `Arc<PixelBuffer>`:
/// `get` after `insert` returns the very buffer that was inserted.
///
/// # Example
///
/// ```
/// use raster_mosaic::raster::{IRect, PixelBuffer, ScalarType};
/// use raster_mosaic::tile::{TileCache, TileCacheKey};
/// use std::sync::Arc;
///
/// let cache = TileCache::new();
/// let key = TileCacheKey::new(0, 256, 0, 0);
/// let tile = Arc::new(PixelBuffer::new(IRect::new(0, 256, 256, 256), 1, ScalarType::U8));
///
/// cache.insert(key, Arc::clone(&tile));
/// assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &tile));
/// assert_eq!(cache.size_in_bytes(), 256 * 256);
/// ```
pub struct TileCache {
    inner: Mutex<CacheInner>,

    /// Maximum total size in bytes (`None` = never evict)
    capacity: Option<usize>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Unbounded cache with the default bucket count.
    pub fn new() -> Self {
        Self::build(DEFAULT_BUCKET_COUNT, None)
    }

    /// Unbounded cache with `bucket_count` buckets (at least one).
    pub fn with_buckets(bucket_count: u32) -> Self {
        Self::build(bucket_count, None)
    }

    /// Bounded cache evicting least-recently-used entries above `max_size`
    /// bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::build(DEFAULT_BUCKET_COUNT, Some(max_size))
    }

    /// Bounded cache with an explicit bucket count.
    pub fn with_buckets_and_capacity(bucket_count: u32, max_size: usize) -> Self {
        Self::build(bucket_count, Some(max_size))
    }

    fn build(bucket_count: u32, capacity: Option<usize>) -> Self {
        let bucket_count = bucket_count.max(1) as usize;
        Self {
            inner: Mutex::new(CacheInner {
                buckets: (0..bucket_count).map(|_| LruCache::unbounded()).collect(),
                size_in_bytes: 0,
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Size accounting must match the entries; a drift is a bug.
    #[inline]
    fn audit(inner: &CacheInner) {
        if cfg!(debug_assertions) {
            let actual = inner.actual_size();
            debug_assert_eq!(
                inner.size_in_bytes, actual,
                "tile cache size accounting drifted"
            );
        }
    }

    /// Get a tile from the cache, marking it recently used.
    pub fn get(&self, key: &TileCacheKey) -> Option<Arc<PixelBuffer>> {
        let mut inner = self.lock();
        let bucket = key.bucket(inner.buckets.len());
        match inner.buckets[bucket].get(key) {
            Some(tile) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(?key, "tile cache hit");
                Some(Arc::clone(tile))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(?key, "tile cache miss");
                None
            }
        }
    }

    /// Check for a key without touching LRU order or statistics.
    pub fn contains(&self, key: &TileCacheKey) -> bool {
        let inner = self.lock();
        inner.buckets[key.bucket(inner.buckets.len())].contains(key)
    }

    /// Store a tile, taking ownership. Returns the entry previously stored
    /// under `key`, if any.
    ///
    /// In a bounded cache a tile larger than the whole capacity is not
    /// stored (any previous entry for the key is still removed).
    pub fn insert(
        &self,
        key: TileCacheKey,
        tile: impl Into<Arc<PixelBuffer>>,
    ) -> Option<Arc<PixelBuffer>> {
        let tile = tile.into();
        let tile_size = tile.byte_size();
        let mut inner = self.lock();
        let bucket = key.bucket(inner.buckets.len());

        if let Some(max_size) = self.capacity {
            if tile_size > max_size {
                warn!(
                    ?key,
                    tile_size, max_size, "tile larger than cache capacity, not cached"
                );
                let previous = inner.buckets[bucket].pop(&key);
                if let Some(ref old) = previous {
                    inner.size_in_bytes = inner.size_in_bytes.saturating_sub(old.byte_size());
                }
                Self::audit(&inner);
                return previous;
            }
        }

        let previous = inner.buckets[bucket].put(key, tile);
        if let Some(ref old) = previous {
            inner.size_in_bytes = inner.size_in_bytes.saturating_sub(old.byte_size());
        }
        inner.size_in_bytes += tile_size;

        if let Some(max_size) = self.capacity {
            while inner.size_in_bytes > max_size {
                if !inner.evict_one(bucket, &key) {
                    break;
                }
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        Self::audit(&inner);
        previous
    }

    /// Remove a tile and hand it back. The cache stops accounting for it.
    pub fn remove(&self, key: &TileCacheKey) -> Option<Arc<PixelBuffer>> {
        let mut inner = self.lock();
        let bucket = key.bucket(inner.buckets.len());
        let removed = inner.buckets[bucket].pop(key);
        if let Some(ref tile) = removed {
            inner.size_in_bytes = inner.size_in_bytes.saturating_sub(tile.byte_size());
        }
        Self::audit(&inner);
        removed
    }

    /// Drop a tile without returning it.
    pub fn invalidate(&self, key: &TileCacheKey) {
        self.remove(key);
    }

    /// Drop every tile.
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        for bucket in inner.buckets.iter_mut() {
            bucket.clear();
        }
        inner.size_in_bytes = 0;
    }

    /// Drop every tile stored under context id `z`.
    pub fn invalidate_context(&self, z: i64) {
        let mut inner = self.lock();
        let mut freed = 0usize;
        for bucket in inner.buckets.iter_mut() {
            let stale: Vec<TileCacheKey> = bucket
                .iter()
                .filter(|(key, _)| key.z == z)
                .map(|(key, _)| *key)
                .collect();
            for key in stale {
                if let Some(tile) = bucket.pop(&key) {
                    freed += tile.byte_size();
                }
            }
        }
        inner.size_in_bytes = inner.size_in_bytes.saturating_sub(freed);
        Self::audit(&inner);
    }

    /// Current total size of cached tiles in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.lock().size_in_bytes
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.lock().buckets.iter().map(LruCache::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Entries per bucket, in bucket order.
    pub fn bucket_lengths(&self) -> Vec<usize> {
        self.lock().buckets.iter().map(LruCache::len).collect()
    }

    /// Maximum size in bytes, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.buckets.iter().map(LruCache::len).sum(),
            size_in_bytes: inner.size_in_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Check size accounting against the stored entries.
    ///
    /// Debug builds report drift as [`PipelineError::CacheInconsistency`].
    /// Release builds log it and reset the total from the entries.
    pub fn verify(&self) -> Result<(), PipelineError> {
        let mut inner = self.lock();
        let actual = inner.actual_size();
        if actual == inner.size_in_bytes {
            return Ok(());
        }
        let tracked = inner.size_in_bytes;
        if cfg!(debug_assertions) {
            return Err(PipelineError::CacheInconsistency { tracked, actual });
        }
        warn!(tracked, actual, "tile cache size drifted, recomputing");
        inner.size_in_bytes = actual;
        Ok(())
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
