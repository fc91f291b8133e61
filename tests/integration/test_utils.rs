//! Test utilities for integration tests.
//!
//! Provides a call-counting source wrapper, constructors for common leaf
//! images and tracing setup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use tracing_subscriber::EnvFilter;

use raster_mosaic::error::PipelineError;
use raster_mosaic::raster::{DPoint, IRect, PixelBuffer, ScalarType};
use raster_mosaic::source::{ImageSource, MemorySource};

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Counting Source
// =============================================================================

/// Wraps a source and counts `get_tile` calls.
///
/// The counter is shared, so it can be read after the source is moved into
/// a graph.
pub struct CountingSource<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
}

impl<S: ImageSource> CountingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> CallCounter {
        CallCounter(Arc::clone(&self.calls))
    }
}

#[derive(Clone)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

impl<S: ImageSource> ImageSource for CountingSource<S> {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_tile(rect, level)
    }

    fn number_of_output_bands(&self) -> u32 {
        self.inner.number_of_output_bands()
    }

    fn output_scalar_type(&self) -> ScalarType {
        self.inner.output_scalar_type()
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        self.inner.null_pixel_value(band)
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        self.inner.min_pixel_value(band)
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        self.inner.max_pixel_value(band)
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        self.inner.initialize()
    }

    fn bounding_rect(&self, level: u32) -> IRect {
        self.inner.bounding_rect(level)
    }

    fn valid_vertices(&self) -> Vec<DPoint> {
        self.inner.valid_vertices()
    }
}

// =============================================================================
// Leaf Constructors
// =============================================================================

/// Single-band 8-bit constant image.
pub fn gray(rect: IRect, value: f64) -> MemorySource {
    MemorySource::filled(rect, 1, ScalarType::U8, value)
}

/// Single-band 8-bit image whose value grows with x (`base + x`), clamped
/// to 255.
pub fn ramp(rect: IRect, base: f64) -> MemorySource {
    let mut image = PixelBuffer::new(rect, 1, ScalarType::U8);
    for y in 0..rect.height as i64 {
        for x in 0..rect.width as i64 {
            let value = (base + (rect.x + x) as f64).min(255.0);
            image.set_sample(0, x, y, value.max(1.0)).unwrap();
        }
    }
    image.validate();
    MemorySource::new(image)
}

/// Constant image with a null rectangle punched out (local coordinates).
pub fn with_hole(rect: IRect, value: f64, hole: IRect) -> MemorySource {
    let mut image = PixelBuffer::new(rect, 1, ScalarType::U8);
    image.fill(0, value);
    for y in hole.y..hole.bottom() {
        for x in hole.x..hole.right() {
            image.set_sample(0, x, y, 0.0).unwrap();
        }
    }
    image.validate();
    MemorySource::new(image)
}

/// Every sample of band 0 as a row-major vector.
pub fn band0(tile: &PixelBuffer) -> Vec<f64> {
    let mut out = Vec::with_capacity(tile.band_len());
    for y in 0..tile.height() as i64 {
        for x in 0..tile.width() as i64 {
            out.push(tile.get_sample(0, x, y).unwrap());
        }
    }
    out
}
