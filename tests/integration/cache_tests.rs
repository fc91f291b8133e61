//! Tile cache integration tests.
//!
//! Tests verify:
//! - Size accounting across buckets
//! - Cached tiles are returned without recomputation
//! - Bounded caches stay within budget
//! - Concurrent access from several threads

use std::sync::Arc;
use std::thread;

use raster_mosaic::combine::{FirstValid, SimpleMosaic};
use raster_mosaic::raster::{IRect, PixelBuffer, ScalarType};
use raster_mosaic::source::{ImageSource, SharedSource};
use raster_mosaic::tile::{CachingSource, TileCache, TileCacheKey};

use super::test_utils::{gray, init_tracing, CountingSource};

fn tile(width: u32, height: u32, bands: u32) -> Arc<PixelBuffer> {
    Arc::new(PixelBuffer::new(
        IRect::new(0, 0, width, height),
        bands,
        ScalarType::U16,
    ))
}

// =============================================================================
// Size Accounting
// =============================================================================

#[test]
fn test_scenario_c_bucketed_accounting() {
    init_tracing();
    let cache = TileCache::with_buckets(4);
    let mut expected = 0;
    let mut entries = Vec::new();
    for i in 0..10u32 {
        let key = TileCacheKey::new(i as i64 * 256, 0, 1, 0);
        let buffer = tile(8 + i, 8, 1 + i % 3);
        expected += buffer.byte_size();
        cache.insert(key, Arc::clone(&buffer));
        entries.push((key, buffer));
    }

    assert_eq!(cache.bucket_count(), 4);
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.size_in_bytes(), expected);
    for (key, buffer) in &entries {
        let hit = cache.get(key).unwrap();
        assert!(Arc::ptr_eq(&hit, buffer));
    }

    let (removed_key, removed) = &entries[3];
    let before = cache.size_in_bytes();
    cache.remove(removed_key).unwrap();
    assert_eq!(cache.size_in_bytes(), before - removed.byte_size());
    assert!(cache.get(removed_key).is_none());
    assert!(cache.verify().is_ok());
}

#[test]
fn test_replacing_entry_updates_size() {
    let cache = TileCache::with_buckets(4);
    let key = TileCacheKey::new(0, 0, 0, 0);
    cache.insert(key, tile(16, 16, 1));
    cache.insert(key, tile(4, 4, 1));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size_in_bytes(), 4 * 4 * 2);
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_cached_tile_is_not_recomputed() {
    let upstream = CountingSource::new(gray(IRect::new(0, 0, 128, 128), 42.0));
    let calls = upstream.counter();
    let mut cached = CachingSource::new(upstream).with_tile_size(64, 64);
    cached.initialize().unwrap();

    let rect = IRect::new(64, 0, 64, 64);
    let first = cached.get_tile(&rect, 0).unwrap();
    let second = cached.get_tile(&rect, 0).unwrap();
    assert_eq!(calls.get(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    let key = TileCacheKey::new(64, 0, cached.cache_id(), 0);
    assert!(Arc::ptr_eq(&cached.cache().get(&key).unwrap(), &first));
}

#[test]
fn test_levels_cached_separately() {
    let upstream = CountingSource::new(gray(IRect::new(0, 0, 64, 64), 42.0));
    let calls = upstream.counter();
    let mut cached = CachingSource::new(upstream).with_tile_size(32, 32);

    cached.get_tile(&IRect::new(0, 0, 32, 32), 0).unwrap();
    cached.get_tile(&IRect::new(0, 0, 32, 32), 1).unwrap();
    cached.get_tile(&IRect::new(0, 0, 32, 32), 1).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_reinitialize_drops_stale_tiles() {
    let upstream = CountingSource::new(gray(IRect::new(0, 0, 32, 32), 1.0));
    let calls = upstream.counter();
    let mut cached = CachingSource::new(upstream).with_tile_size(32, 32);
    let rect = IRect::new(0, 0, 32, 32);

    cached.get_tile(&rect, 0).unwrap();
    cached.initialize().unwrap();
    assert!(cached.cache().is_empty());
    cached.get_tile(&rect, 0).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_disabled_cache_passes_through() {
    let upstream = CountingSource::new(gray(IRect::new(0, 0, 32, 32), 1.0));
    let calls = upstream.counter();
    let mut cached = CachingSource::new(upstream);
    cached.set_caching_enabled_flag(false);

    let rect = IRect::new(0, 0, 32, 32);
    cached.get_tile(&rect, 0).unwrap();
    cached.get_tile(&rect, 0).unwrap();
    assert_eq!(calls.get(), 2);
    assert!(cached.cache().is_empty());
}

// =============================================================================
// Bounded Cache
// =============================================================================

#[test]
fn test_bounded_cache_under_mosaic_load() {
    init_tracing();
    // room for four 32x32 one-band 8-bit tiles
    let cache = Arc::new(TileCache::with_buckets_and_capacity(3, 4 * 32 * 32));
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 256, 64), 9.0));
    let mut cached = CachingSource::with_cache(mosaic, Arc::clone(&cache), 7).with_tile_size(32, 32);
    cached.initialize().unwrap();

    for x in (0..256).step_by(32) {
        for y in (0..64).step_by(32) {
            let out = cached.get_tile(&IRect::new(x, y, 32, 32), 0).unwrap();
            assert_eq!(out.get_sample(0, 0, 0).unwrap(), 9.0);
            assert!(cache.size_in_bytes() <= 4 * 32 * 32);
        }
    }
    let stats = cache.stats();
    assert_eq!(stats.entries, 4);
    assert_eq!(stats.evictions, 12);
    assert!(cache.verify().is_ok());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_inserts_and_gets() {
    let cache = Arc::new(TileCache::with_buckets(8));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..50i64 {
                    let key = TileCacheKey::new(i * 64, t * 64, t, 0);
                    cache.insert(key, tile(4, 4, 1));
                    assert!(cache.get(&key).is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 200);
    assert_eq!(cache.size_in_bytes(), 200 * 4 * 4 * 2);
    assert!(cache.verify().is_ok());
}

#[test]
fn test_shared_caching_source_across_threads() {
    let upstream = CountingSource::new(gray(IRect::new(0, 0, 256, 256), 5.0));
    let calls = upstream.counter();
    let shared = SharedSource::new(CachingSource::new(upstream).with_tile_size(64, 64));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut source = shared.clone();
            thread::spawn(move || {
                for x in (0..256).step_by(64) {
                    let tile = source.get_tile(&IRect::new(x, 0, 64, 64), 0).unwrap();
                    assert_eq!(tile.get_sample(0, 10, 10).unwrap(), 5.0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(calls.get(), 4);
}
