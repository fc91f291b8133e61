//! In-memory leaf source.
//!
//! Holds a full-resolution raster and serves any rect from it. Reduced
//! resolution levels are built on first request with a null-aware 2x2
//! average: null samples contribute nothing, and a 2x2 block with no valid
//! sample stays null.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::raster::{DPoint, IRect, PixelBuffer, ScalarType};

use super::{publish_tile, recycle_tile, ImageSource};

/// Levels beyond this are never built.
const MAX_LEVELS: u32 = 32;

/// A raster held entirely in memory.
///
/// # Example
///
/// ```
/// use raster_mosaic::raster::{IRect, ScalarType};
/// use raster_mosaic::source::{ImageSource, MemorySource};
///
/// let mut source = MemorySource::filled(IRect::new(0, 0, 8, 8), 1, ScalarType::U8, 42.0);
/// let tile = source.get_tile(&IRect::new(4, 4, 8, 8), 0).unwrap();
/// assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 42.0);
/// assert_eq!(tile.get_sample(0, 4, 4).unwrap(), 0.0); // outside coverage: null
/// ```
#[derive(Debug)]
pub struct MemorySource {
    /// Level 0 at index 0, reduced levels appended lazily
    levels: Vec<PixelBuffer>,

    /// Valid-data polygon, level-0 pixel space
    valid_vertices: Option<Vec<DPoint>>,

    /// Output buffer reused between calls
    tile: Option<Arc<PixelBuffer>>,
}

impl MemorySource {
    /// Serve `image`; its rect is the level-0 extent.
    pub fn new(image: PixelBuffer) -> Self {
        Self {
            levels: vec![image],
            valid_vertices: None,
            tile: None,
        }
    }

    /// A source whose every band is `value` over `rect`.
    pub fn filled(rect: IRect, band_count: u32, scalar: ScalarType, value: f64) -> Self {
        let mut image = PixelBuffer::new(rect, band_count, scalar);
        for band in 0..band_count {
            image.fill(band, value);
        }
        image.validate();
        Self::new(image)
    }

    /// Override the valid-data polygon used for feathering.
    pub fn with_valid_vertices(mut self, vertices: Vec<DPoint>) -> Self {
        self.valid_vertices = Some(vertices);
        self
    }

    /// The full-resolution image.
    pub fn image(&self) -> &PixelBuffer {
        &self.levels[0]
    }

    /// Mutable access to the full-resolution image. Drops any reduced
    /// levels so they are rebuilt from the new data.
    pub fn image_mut(&mut self) -> &mut PixelBuffer {
        self.levels.truncate(1);
        &mut self.levels[0]
    }

    fn level(&mut self, level: u32) -> &PixelBuffer {
        let level = level.min(MAX_LEVELS) as usize;
        while self.levels.len() <= level {
            let next = reduce(&self.levels[self.levels.len() - 1]);
            self.levels.push(next);
        }
        &self.levels[level]
    }
}

/// Null-aware 2x2 average into the next coarser level.
fn reduce(src: &PixelBuffer) -> PixelBuffer {
    let src_rect = src.rect();
    let dst_rect = src_rect.at_level(1);
    let mut dst = PixelBuffer::new(dst_rect, src.band_count(), src.scalar_type());
    for band in 0..src.band_count() {
        dst.set_null_value(band, src.null_value(band));
        dst.set_min_value(band, src.min_value(band));
        dst.set_max_value(band, src.max_value(band));
    }
    dst.make_blank();

    let src_w = src_rect.width as usize;
    let dst_w = dst_rect.width as usize;
    let scalar = src.scalar_type();
    for band in 0..src.band_count() {
        for dy in 0..dst_rect.height as i64 {
            for dx in 0..dst_rect.width as i64 {
                let gx = (dst_rect.x + dx) * 2;
                let gy = (dst_rect.y + dy) * 2;
                let mut sum = 0.0;
                let mut count = 0u32;
                for (ox, oy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let (x, y) = (gx + ox, gy + oy);
                    if !src_rect.contains_point(x, y) {
                        continue;
                    }
                    let idx = (y - src_rect.y) as usize * src_w + (x - src_rect.x) as usize;
                    if let Some(v) = src.valid_at(band, idx) {
                        sum += v;
                        count += 1;
                    }
                }
                if count > 0 {
                    let idx = dy as usize * dst_w + dx as usize;
                    dst.set_value_at(band, idx, scalar.clamp_value(sum / count as f64));
                }
            }
        }
    }
    dst.validate();
    dst
}

impl ImageSource for MemorySource {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        if rect.is_empty() {
            return None;
        }
        let mut slot = self.tile.take();
        let source = self.level(level);
        if !source.rect().intersects(rect) {
            self.tile = slot;
            return None;
        }

        let mut tile = recycle_tile(
            &mut slot,
            *rect,
            source.band_count(),
            source.scalar_type(),
        );
        for band in 0..source.band_count() {
            tile.set_null_value(band, source.null_value(band));
            tile.set_min_value(band, source.min_value(band));
            tile.set_max_value(band, source.max_value(band));
        }
        tile.make_blank();
        tile.load_tile(source);
        tile.validate();
        Some(publish_tile(&mut self.tile, tile))
    }

    fn number_of_output_bands(&self) -> u32 {
        self.levels[0].band_count()
    }

    fn output_scalar_type(&self) -> ScalarType {
        self.levels[0].scalar_type()
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        self.levels[0].null_value(band)
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        self.levels[0].min_value(band)
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        self.levels[0].max_value(band)
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        self.levels.truncate(1);
        Ok(())
    }

    fn bounding_rect(&self, level: u32) -> IRect {
        self.levels[0].rect().at_level(level)
    }

    fn valid_vertices(&self) -> Vec<DPoint> {
        match &self.valid_vertices {
            Some(vertices) => vertices.clone(),
            None => super::rect_vertices(&self.levels[0].rect()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
