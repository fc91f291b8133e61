//! Blend integration tests.
//!
//! Tests verify:
//! - Equal-weight blending of overlapping sources
//! - Convexity of weighted and feathered results
//! - Feather weights normalize to one at every covered pixel
//! - Blending across scalar types and resolution levels

use raster_mosaic::combine::{
    BlendMosaic, CombinerKind, FeatherBlend, FeatherFalloff, FeatherMosaic, WeightedBlend,
};
use raster_mosaic::config::PipelineConfig;
use raster_mosaic::context::PipelineContext;
use raster_mosaic::raster::{DPoint, IRect, RemapTable, ScalarType, TileStatus};
use raster_mosaic::source::{ImageSource, MemorySource};

use super::test_utils::{band0, gray, init_tracing, ramp, with_hole};

// =============================================================================
// Weighted Blend
// =============================================================================

#[test]
fn test_scenario_b_equal_weights() {
    init_tracing();
    let mut blend = BlendMosaic::new(WeightedBlend::new());
    blend.connect(gray(IRect::new(0, 0, 4, 4), 100.0));
    blend.connect(gray(IRect::new(2, 0, 4, 4), 200.0));
    blend.initialize().unwrap();

    let tile = blend.get_tile(&IRect::new(0, 0, 6, 4), 0).unwrap();
    let table = RemapTable::for_scalar(ScalarType::U8).unwrap();
    let norm = table.norm_from_native(tile.get_sample(0, 2, 0).unwrap());
    assert!((norm - 0.588).abs() < 0.005, "{norm}");
    assert_eq!(tile.get_sample(0, 3, 3).unwrap(), 150.0);

    // outside the overlap each source passes through
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 100.0);
    assert_eq!(tile.get_sample(0, 5, 0).unwrap(), 200.0);
}

#[test]
fn test_weighted_blend_convexity() {
    let rect = IRect::new(0, 0, 32, 8);
    let inputs = [ramp(rect, 0.0), ramp(rect, 100.0), gray(rect, 60.0)];
    let values: Vec<Vec<f64>> = inputs.iter().map(|s| band0(s.image())).collect();

    let mut blend = BlendMosaic::new(WeightedBlend::with_weights(vec![0.2, 5.0, 1.0]));
    for input in inputs {
        blend.connect(input);
    }
    let tile = blend.get_tile(&rect, 0).unwrap();

    for (idx, out) in band0(&tile).into_iter().enumerate() {
        let lo = values.iter().map(|v| v[idx]).fold(f64::INFINITY, f64::min);
        let hi = values.iter().map(|v| v[idx]).fold(f64::NEG_INFINITY, f64::max);
        assert!(out >= lo - 0.5 && out <= hi + 0.5, "idx {idx}: {out} not in [{lo}, {hi}]");
    }
}

#[test]
fn test_blend_all_null_stays_null() {
    let rect = IRect::new(0, 0, 4, 4);
    let hole = IRect::new(1, 1, 2, 2);
    let mut blend = BlendMosaic::new(WeightedBlend::new());
    blend.connect(with_hole(rect, 100.0, hole));
    blend.connect(with_hole(rect, 200.0, hole));

    let tile = blend.get_tile(&rect, 0).unwrap();
    assert!(tile.is_null(0, 1, 1).unwrap());
    assert!(tile.is_null(0, 2, 2).unwrap());
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 150.0);
    assert_eq!(tile.status(), TileStatus::Partial);
}

#[test]
fn test_blend_across_bit_depths() {
    let rect = IRect::new(0, 0, 2, 2);
    let mut blend = BlendMosaic::new(WeightedBlend::new());
    blend.connect(gray(rect, 255.0));
    blend.connect(MemorySource::filled(rect, 1, ScalarType::U11, 0.0));
    blend.connect(MemorySource::filled(rect, 1, ScalarType::U11, 2047.0));
    blend.initialize().unwrap();

    // U11 zero is null, so only the two full-scale inputs contribute
    let tile = blend.get_tile(&rect, 0).unwrap();
    assert_eq!(tile.scalar_type(), ScalarType::U8);
    assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 255.0);
}

#[test]
fn test_blend_from_context_config() {
    let config = PipelineConfig::from_json(
        r#"{ "combiner": "weighted-blend", "weights": [1.0, 3.0], "tile_width": 8, "tile_height": 8 }"#,
    )
    .unwrap();
    let context = PipelineContext::new(config).unwrap();
    let rect = IRect::new(0, 0, 16, 16);
    let inputs: Vec<Box<dyn ImageSource>> = vec![Box::new(gray(rect, 40.0)), Box::new(gray(rect, 240.0))];
    let mut root = context.caching_source(context.build_default_combiner(inputs));
    root.initialize().unwrap();

    let tile = root.get_tile(&IRect::new(4, 4, 8, 8), 0).unwrap();
    assert!(band0(&tile).iter().all(|v| *v == 190.0));
    assert_eq!(context.cache().len(), 4);
}

// =============================================================================
// Feather Blend
// =============================================================================

fn feather_pair(falloff: FeatherFalloff) -> FeatherMosaic {
    let mut mosaic = FeatherMosaic::new(FeatherBlend::new().with_falloff(falloff));
    mosaic.connect(gray(IRect::new(0, 0, 64, 32), 40.0));
    mosaic.connect(gray(IRect::new(32, 0, 64, 32), 220.0));
    mosaic
}

#[test]
fn test_feather_weight_sum() {
    for falloff in [FeatherFalloff::Linear, FeatherFalloff::Smooth] {
        let mut mosaic = feather_pair(falloff);
        mosaic.initialize().unwrap();
        let feather = mosaic.compositor();

        for x in (0..96).step_by(3) {
            for y in (0..32).step_by(5) {
                let point = DPoint::new(x as f64, y as f64);
                let valid = [x < 64, x >= 32];
                let raw: f64 = (0..2)
                    .filter(|&i| valid[i])
                    .map(|i| feather.compute_weight(i, point))
                    .sum();
                assert!(raw > 0.0);
                let sum: f64 = feather.normalized_weights(point, &valid).iter().sum();
                assert!((sum - 1.0).abs() < 1e-9, "{falloff:?} ({x}, {y}): {sum}");
            }
        }
    }
}

#[test]
fn test_feather_convex_and_seamless() {
    let mut mosaic = feather_pair(FeatherFalloff::Smooth);
    let tile = mosaic.get_tile(&IRect::new(0, 0, 96, 32), 0).unwrap();
    assert_eq!(tile.status(), TileStatus::Full);

    let row: Vec<f64> = (0..96).map(|x| tile.get_sample(0, x, 16).unwrap()).collect();
    assert!(row.iter().all(|v| (40.0..=220.0).contains(v)));
    // no hard seam at either input edge
    for x in 1..96 {
        assert!((row[x] - row[x - 1]).abs() <= 40.0, "jump at {x}: {} -> {}", row[x - 1], row[x]);
    }
    assert_eq!(row[0], 40.0);
    assert_eq!(row[95], 220.0);
}

#[test]
fn test_feather_at_reduced_level_matches_level_zero_geometry() {
    let mut mosaic = feather_pair(FeatherFalloff::Linear);
    let full = mosaic.get_tile(&IRect::new(0, 0, 96, 32), 0).unwrap();
    let full_row: Vec<f64> = (0..96).map(|x| full.get_sample(0, x, 15).unwrap()).collect();

    let level1 = mosaic.bounding_rect(1);
    assert_eq!(level1, IRect::new(0, 0, 48, 16));
    let half = mosaic.get_tile(&level1, 1).unwrap();

    for x in 0..48i64 {
        let reduced = half.get_sample(0, x, 7).unwrap();
        let a = full_row[2 * x as usize];
        let b = full_row[2 * x as usize + 1];
        let (lo, hi) = (a.min(b), a.max(b));
        assert!(reduced >= lo - 6.0 && reduced <= hi + 6.0, "x={x}: {reduced} vs [{lo}, {hi}]");
    }
}

#[test]
fn test_feather_with_polygon_override() {
    let rect = IRect::new(0, 0, 32, 32);
    let inner = vec![
        DPoint::new(8.0, 8.0),
        DPoint::new(24.0, 8.0),
        DPoint::new(24.0, 24.0),
        DPoint::new(8.0, 24.0),
    ];
    let mut mosaic = FeatherMosaic::new(FeatherBlend::new());
    mosaic.connect(gray(rect, 200.0).with_valid_vertices(inner));
    mosaic.connect(gray(rect, 20.0));
    mosaic.initialize().unwrap();

    let tile = mosaic.get_tile(&rect, 0).unwrap();
    let center = tile.get_sample(0, 16, 16).unwrap();
    let corner = tile.get_sample(0, 1, 1).unwrap();
    assert!(center > corner, "{center} <= {corner}");
    assert!(corner < 30.0);
}

#[test]
fn test_feather_kind_from_config() {
    let config = PipelineConfig {
        combiner: CombinerKind::FeatherBlend,
        feather_falloff: FeatherFalloff::Smooth,
        ..PipelineConfig::default()
    };
    let context = PipelineContext::new(config).unwrap();
    let inputs: Vec<Box<dyn ImageSource>> = vec![
        Box::new(gray(IRect::new(0, 0, 16, 16), 10.0)),
        Box::new(gray(IRect::new(8, 0, 16, 16), 30.0)),
    ];
    let mut feather = context.build_default_combiner(inputs);
    feather.initialize().unwrap();
    let tile = feather.get_tile(&IRect::new(0, 0, 24, 16), 0).unwrap();
    assert_eq!(tile.status(), TileStatus::Full);
}
