//! Tile-cache decorator for a single upstream source.
//!
//! The CachingSource sits between a consumer and an expensive subgraph:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CachingSource                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Split rect into fixed tiles  3. Pull misses         │    │
//! │  │  2. Check cache per tile         4. Insert & assemble   │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                                     │               │
//! │           ▼                                     ▼               │
//! │    ┌───────────┐                       ┌──────────────────┐     │
//! │    │ TileCache │                       │  upstream input  │     │
//! │    └───────────┘                       └──────────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests are always answered from whole fixed-size tiles aligned to the
//! level's origin, so consumers that pan or zoom with arbitrary rects still
//! hit a small set of cache keys.

use std::sync::Arc;

use tracing::debug;

use crate::error::PipelineError;
use crate::raster::{DPoint, IRect, PixelBuffer, ScalarType};
use crate::source::{publish_tile, recycle_tile, ImageSource};

use super::cache::{TileCache, TileCacheKey};

/// Default fixed tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Caching Source
// =============================================================================

/// An [`ImageSource`] that memoizes its input's tiles in a [`TileCache`].
///
/// # Example
///
/// ```
/// use raster_mosaic::raster::{IRect, ScalarType};
/// use raster_mosaic::source::{ImageSource, MemorySource};
/// use raster_mosaic::tile::CachingSource;
///
/// let leaf = MemorySource::filled(IRect::new(0, 0, 512, 512), 1, ScalarType::U8, 3.0);
/// let mut cached = CachingSource::new(leaf).with_tile_size(128, 128);
///
/// let rect = IRect::new(0, 0, 128, 128);
/// let first = cached.get_tile(&rect, 0).unwrap();
/// let second = cached.get_tile(&rect, 0).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct CachingSource {
    /// The single upstream input
    input: Box<dyn ImageSource>,

    /// Possibly shared with other caching sources
    cache: Arc<TileCache>,

    /// Key context separating this source's tiles in a shared cache
    cache_id: i64,

    enabled: bool,

    tile_width: u32,
    tile_height: u32,

    /// Assembly buffer for requests spanning several fixed tiles
    tile: Option<Arc<PixelBuffer>>,
}

impl CachingSource {
    /// Wrap `input` with a private, unbounded cache.
    pub fn new(input: impl ImageSource + 'static) -> Self {
        Self::with_cache(input, Arc::new(TileCache::new()), 0)
    }

    /// Wrap `input` with a shared cache. `cache_id` must be unique among the
    /// sources sharing `cache`.
    pub fn with_cache(input: impl ImageSource + 'static, cache: Arc<TileCache>, cache_id: i64) -> Self {
        Self {
            input: Box::new(input),
            cache,
            cache_id,
            enabled: true,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            tile: None,
        }
    }

    /// Set the fixed tile size used to address the cache (minimum 1x1).
    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width.max(1);
        self.tile_height = height.max(1);
        self
    }

    /// Enable or disable cache lookups and inserts. Existing entries are
    /// kept either way.
    pub fn set_caching_enabled_flag(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn caching_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop every entry in the underlying cache.
    pub fn flush(&mut self) {
        debug!(cache_id = self.cache_id, "flushing tile cache");
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn cache_id(&self) -> i64 {
        self.cache_id
    }

    pub fn fixed_tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn input(&self) -> &dyn ImageSource {
        self.input.as_ref()
    }

    /// Mutable access to the input. Call [`ImageSource::initialize`]
    /// afterwards if its geometry changed.
    pub fn input_mut(&mut self) -> &mut dyn ImageSource {
        self.input.as_mut()
    }

    /// Fixed tiles covering `rect`, row by row.
    fn fixed_tiles(&self, rect: &IRect) -> Vec<IRect> {
        let tw = self.tile_width as i64;
        let th = self.tile_height as i64;
        let x0 = rect.x.div_euclid(tw) * tw;
        let y0 = rect.y.div_euclid(th) * th;
        let mut tiles = Vec::new();
        let mut y = y0;
        while y < rect.bottom() {
            let mut x = x0;
            while x < rect.right() {
                tiles.push(IRect::new(x, y, self.tile_width, self.tile_height));
                x += tw;
            }
            y += th;
        }
        tiles
    }

    /// One fixed tile, from the cache or from upstream.
    fn fetch(&mut self, tile_rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        let key = TileCacheKey::new(tile_rect.x, tile_rect.y, self.cache_id, level);
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }
        let produced = self.input.get_tile(tile_rect, level)?;
        self.cache.insert(key, Arc::clone(&produced));
        Some(produced)
    }
}

impl ImageSource for CachingSource {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        if rect.is_empty() {
            return None;
        }
        if !self.enabled {
            return self.input.get_tile(rect, level);
        }

        let bounds = self.input.bounding_rect(level);
        if !bounds.intersects(rect) {
            return None;
        }
        let tiles: Vec<IRect> = self
            .fixed_tiles(rect)
            .into_iter()
            .filter(|t| t.intersects(&bounds))
            .collect();

        // Aligned single-tile request: hand out the cached buffer itself
        if tiles.len() == 1 && tiles[0] == *rect {
            return self.fetch(rect, level);
        }

        let band_count = self.input.number_of_output_bands();
        let mut slot = self.tile.take();
        let mut output = recycle_tile(&mut slot, *rect, band_count, self.input.output_scalar_type());
        for band in 0..band_count {
            output.set_null_value(band, self.input.null_pixel_value(band));
            output.set_min_value(band, self.input.min_pixel_value(band));
            output.set_max_value(band, self.input.max_pixel_value(band));
        }
        output.make_blank();

        let mut produced_any = false;
        for tile_rect in &tiles {
            if let Some(source) = self.fetch(tile_rect, level) {
                output.load_tile(&source);
                produced_any = true;
            }
        }
        if !produced_any {
            return None;
        }
        output.validate();
        Some(publish_tile(&mut self.tile, output))
    }

    fn number_of_output_bands(&self) -> u32 {
        self.input.number_of_output_bands()
    }

    fn output_scalar_type(&self) -> ScalarType {
        self.input.output_scalar_type()
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        self.input.null_pixel_value(band)
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        self.input.min_pixel_value(band)
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        self.input.max_pixel_value(band)
    }

    /// Re-initialize the input and drop this source's now-stale tiles.
    fn initialize(&mut self) -> Result<(), PipelineError> {
        self.input.initialize()?;
        self.cache.invalidate_context(self.cache_id);
        debug!(cache_id = self.cache_id, "caching source initialized");
        Ok(())
    }

    fn bounding_rect(&self, level: u32) -> IRect {
        self.input.bounding_rect(level)
    }

    fn valid_vertices(&self) -> Vec<DPoint> {
        self.input.valid_vertices()
    }

    fn number_of_inputs(&self) -> usize {
        1
    }
}

// =============================================================================
// Tests
// =============================================================================
