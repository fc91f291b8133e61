//! Mosaic integration tests.
//!
//! Tests verify:
//! - First-valid overlap order and null propagation
//! - Per-pixel maximum
//! - Resolution-level scaling through combiners
//! - Graph behaviour with shared and cached inputs

use raster_mosaic::combine::{FirstValid, MaxMosaic, MaxValue, SimpleMosaic};
use raster_mosaic::raster::{IRect, PixelBuffer, ScalarType, TileStatus};
use raster_mosaic::source::{ImageSource, MemorySource, SharedSource};
use raster_mosaic::tile::{CachingSource, JpegTileEncoder};

use super::test_utils::{band0, gray, init_tracing, ramp, with_hole, CountingSource};

// =============================================================================
// Simple Mosaic
// =============================================================================

#[test]
fn test_scenario_a_first_input_wins_overlap() {
    init_tracing();
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 4, 4), 100.0));
    mosaic.connect(gray(IRect::new(2, 0, 4, 4), 200.0));
    mosaic.initialize().unwrap();

    let tile = mosaic.get_tile(&IRect::new(0, 0, 6, 4), 0).unwrap();
    assert_eq!(tile.rect(), IRect::new(0, 0, 6, 4));
    for y in 0..4 {
        for x in 0..6 {
            let expected = if x <= 3 { 100.0 } else { 200.0 };
            assert_eq!(tile.get_sample(0, x, y).unwrap(), expected, "({x}, {y})");
        }
    }
    assert_eq!(tile.status(), TileStatus::Full);
}

#[test]
fn test_simple_mosaic_null_invariant() {
    init_tracing();
    let rect = IRect::new(0, 0, 8, 8);
    let a = with_hole(rect, 10.0, IRect::new(0, 0, 4, 8));
    let b = with_hole(rect, 20.0, IRect::new(2, 2, 4, 4));
    let a_image = a.image().clone();
    let b_image = b.image().clone();

    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(a);
    mosaic.connect(b);
    let tile = mosaic.get_tile(&rect, 0).unwrap();

    for y in 0..8 {
        for x in 0..8 {
            let a_null = a_image.is_null(0, x, y).unwrap();
            let b_null = b_image.is_null(0, x, y).unwrap();
            let out = tile.get_sample(0, x, y).unwrap();
            assert_eq!(tile.is_null(0, x, y).unwrap(), a_null && b_null);
            if !a_null {
                assert_eq!(out, 10.0);
            } else if !b_null {
                assert_eq!(out, 20.0);
            }
        }
    }
    assert_eq!(tile.status(), TileStatus::Partial);
}

#[test]
fn test_request_partly_outside_is_partial() {
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 4, 4), 100.0));

    let tile = mosaic.get_tile(&IRect::new(2, 2, 4, 4), 0).unwrap();
    assert_eq!(tile.status(), TileStatus::Partial);
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 100.0);
    assert!(tile.is_null(0, 3, 3).unwrap());
}

#[test]
fn test_multiband_mosaic() {
    let rect = IRect::new(0, 0, 4, 4);
    let mut rgb = PixelBuffer::new(rect, 3, ScalarType::U8);
    for (band, value) in [(0, 10.0), (1, 20.0), (2, 30.0)] {
        rgb.fill(band, value);
    }
    rgb.validate();

    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(MemorySource::new(rgb));
    mosaic.connect(MemorySource::filled(IRect::new(4, 0, 4, 4), 3, ScalarType::U8, 99.0));

    let tile = mosaic.get_tile(&IRect::new(0, 0, 8, 4), 0).unwrap();
    assert_eq!(tile.band_count(), 3);
    assert_eq!(tile.get_sample(2, 0, 0).unwrap(), 30.0);
    assert_eq!(tile.get_sample(1, 7, 3).unwrap(), 99.0);
}

// =============================================================================
// Max Mosaic
// =============================================================================

#[test]
fn test_max_mosaic_correctness() {
    let rect = IRect::new(0, 0, 16, 4);
    let a = ramp(rect, 0.0);
    let b = with_hole(rect, 8.0, IRect::new(12, 0, 4, 4));
    let a_values = band0(a.image());
    let b_image = b.image().clone();

    let mut mosaic = MaxMosaic::new(MaxValue::new());
    mosaic.connect(a);
    mosaic.connect(b);
    let tile = mosaic.get_tile(&rect, 0).unwrap();
    let out = band0(&tile);

    for (idx, value) in out.iter().enumerate() {
        let x = (idx % 16) as i64;
        let y = (idx / 16) as i64;
        let expected = if b_image.is_null(0, x, y).unwrap() {
            a_values[idx]
        } else {
            a_values[idx].max(8.0)
        };
        assert_eq!(*value, expected, "({x}, {y})");
    }
}

// =============================================================================
// Resolution Levels
// =============================================================================

#[test]
fn test_bounding_rect_halves_per_level() {
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 1000, 600), 1.0));
    mosaic.connect(gray(IRect::new(500, 300, 501, 301), 1.0));

    let mut previous = mosaic.bounding_rect(0);
    for level in 1..6 {
        let rect = mosaic.bounding_rect(level);
        let half_w = previous.width as i64 / 2;
        let half_h = previous.height as i64 / 2;
        assert!((rect.width as i64 - half_w).abs() <= 1, "level {level}: {rect:?}");
        assert!((rect.height as i64 - half_h).abs() <= 1, "level {level}: {rect:?}");
        previous = rect;
    }
}

#[test]
fn test_reduced_level_tile() {
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 8, 8), 100.0));
    mosaic.connect(gray(IRect::new(8, 0, 8, 8), 200.0));

    let level1 = mosaic.bounding_rect(1);
    assert_eq!(level1, IRect::new(0, 0, 8, 4));
    let tile = mosaic.get_tile(&level1, 1).unwrap();
    assert_eq!(tile.get_sample(0, 3, 0).unwrap(), 100.0);
    assert_eq!(tile.get_sample(0, 4, 0).unwrap(), 200.0);
    assert_eq!(tile.status(), TileStatus::Full);
}

// =============================================================================
// Graph Composition
// =============================================================================

#[test]
fn test_shared_input_feeds_two_mosaics() {
    let shared = SharedSource::new(gray(IRect::new(0, 0, 4, 4), 50.0));

    let mut first = SimpleMosaic::new(FirstValid::new());
    first.connect(shared.clone());
    first.connect(gray(IRect::new(0, 0, 8, 4), 1.0));

    let mut second = MaxMosaic::new(MaxValue::new());
    second.connect(shared);
    second.connect(gray(IRect::new(0, 0, 8, 4), 70.0));

    let rect = IRect::new(0, 0, 8, 4);
    let a = first.get_tile(&rect, 0).unwrap();
    let b = second.get_tile(&rect, 0).unwrap();
    assert_eq!(a.get_sample(0, 0, 0).unwrap(), 50.0);
    assert_eq!(a.get_sample(0, 6, 0).unwrap(), 1.0);
    assert_eq!(b.get_sample(0, 0, 0).unwrap(), 70.0);
}

#[test]
fn test_nested_combiners() {
    let mut inner = SimpleMosaic::new(FirstValid::new());
    inner.connect(gray(IRect::new(0, 0, 4, 4), 10.0));

    let mut outer = MaxMosaic::new(MaxValue::new());
    outer.connect(inner);
    outer.connect(gray(IRect::new(0, 0, 8, 4), 5.0));
    outer.initialize().unwrap();

    let tile = outer.get_tile(&IRect::new(0, 0, 8, 4), 0).unwrap();
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 10.0);
    assert_eq!(tile.get_sample(0, 7, 0).unwrap(), 5.0);
}

#[test]
fn test_cached_inputs_with_misaligned_tiles() {
    let a = CountingSource::new(gray(IRect::new(0, 0, 40, 40), 100.0));
    let calls = a.counter();
    let cached_a = CachingSource::new(a).with_tile_size(16, 16);

    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(cached_a);
    mosaic.connect(gray(IRect::new(20, 0, 40, 40), 200.0));
    mosaic.initialize().unwrap();

    let rect = IRect::new(10, 10, 30, 12);
    let tile = mosaic.get_tile(&rect, 0).unwrap();
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 100.0);
    assert_eq!(tile.get_sample(0, 29, 11).unwrap(), 100.0);
    let first_calls = calls.get();
    assert!(first_calls > 0);

    mosaic.get_tile(&rect, 0).unwrap();
    assert_eq!(calls.get(), first_calls);
}

#[test]
fn test_misconfigured_graph_yields_none() {
    init_tracing();
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(gray(IRect::new(0, 0, 4, 4), 1.0));
    mosaic.connect(MemorySource::filled(IRect::new(0, 0, 4, 4), 3, ScalarType::U8, 1.0));

    assert!(mosaic.initialize().is_err());
    for _ in 0..3 {
        assert!(mosaic.get_tile(&IRect::new(0, 0, 4, 4), 0).is_none());
    }
}

#[test]
fn test_mosaic_to_jpeg() {
    let mut mosaic = SimpleMosaic::new(FirstValid::new());
    mosaic.connect(MemorySource::filled(IRect::new(0, 0, 32, 32), 3, ScalarType::U8, 90.0));
    mosaic.connect(MemorySource::filled(IRect::new(16, 0, 32, 32), 3, ScalarType::U8, 180.0));

    let tile = mosaic.get_tile(&IRect::new(0, 0, 48, 32), 0).unwrap();
    let jpeg = JpegTileEncoder::new().encode(&tile, 90).unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (48, 32));
    let left = decoded.get_pixel(2, 2)[0] as i32;
    let right = decoded.get_pixel(45, 2)[0] as i32;
    assert!((left - 90).abs() <= 4, "{left}");
    assert!((right - 180).abs() <= 4, "{right}");
}
