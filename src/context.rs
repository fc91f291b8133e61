//! Pipeline construction context.
//!
//! A [`PipelineContext`] owns what a process would otherwise keep in global
//! registries: the configuration, one shared [`TileCache`], the allocator
//! handing each [`CachingSource`] its own key space in that cache, and a
//! name-to-constructor table for leaf sources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::combine::CombinerKind;
use crate::config::PipelineConfig;
use crate::error::{EncodeError, PipelineError};
use crate::raster::PixelBuffer;
use crate::source::ImageSource;
use crate::tile::{CachingSource, JpegTileEncoder, TileCache};

/// Constructor for a named leaf kind.
pub type SourceFactory = Box<dyn Fn() -> Box<dyn ImageSource> + Send + Sync>;

// =============================================================================
// Pipeline Context
// =============================================================================

/// Builds graph nodes that share one cache and one configuration.
///
/// # Example
///
/// ```
/// use raster_mosaic::combine::CombinerKind;
/// use raster_mosaic::config::PipelineConfig;
/// use raster_mosaic::context::PipelineContext;
/// use raster_mosaic::raster::{IRect, ScalarType};
/// use raster_mosaic::source::{ImageSource, MemorySource};
///
/// let context = PipelineContext::new(PipelineConfig::default()).unwrap();
/// let inputs: Vec<Box<dyn ImageSource>> = vec![
///     Box::new(MemorySource::filled(IRect::new(0, 0, 64, 64), 1, ScalarType::U8, 10.0)),
///     Box::new(MemorySource::filled(IRect::new(32, 0, 64, 64), 1, ScalarType::U8, 20.0)),
/// ];
/// let mosaic = context.build_combiner(CombinerKind::SimpleMosaic, inputs);
/// let mut root = context.caching_source(mosaic);
/// root.initialize().unwrap();
///
/// let tile = root.get_tile(&IRect::new(0, 0, 96, 64), 0).unwrap();
/// assert_eq!(tile.get_sample(0, 95, 0).unwrap(), 20.0);
/// ```
pub struct PipelineContext {
    config: PipelineConfig,
    cache: Arc<TileCache>,
    next_cache_id: AtomicI64,
    factories: HashMap<String, SourceFactory>,
}

impl PipelineContext {
    /// Validate `config` and allocate the shared cache.
    pub fn new(config: PipelineConfig) -> Result<Self, String> {
        config.validate()?;
        let cache = match config.cache_capacity {
            Some(capacity) => TileCache::with_buckets_and_capacity(config.bucket_count, capacity),
            None => TileCache::with_buckets(config.bucket_count),
        };
        debug!(
            buckets = config.bucket_count,
            capacity = ?config.cache_capacity,
            "pipeline context created"
        );
        Ok(Self {
            config,
            cache: Arc::new(cache),
            next_cache_id: AtomicI64::new(0),
            factories: HashMap::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// A fresh cache id, distinct from every id handed out before.
    pub fn next_cache_id(&self) -> i64 {
        self.next_cache_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wrap `input` in a [`CachingSource`] backed by the shared cache.
    pub fn caching_source(&self, input: impl ImageSource + 'static) -> CachingSource {
        let mut source = CachingSource::with_cache(input, Arc::clone(&self.cache), self.next_cache_id())
            .with_tile_size(self.config.tile_width, self.config.tile_height);
        source.set_caching_enabled_flag(self.config.caching_enabled);
        source
    }

    /// Build a combiner of `kind` over `inputs` with the configured
    /// compositor parameters.
    pub fn build_combiner(
        &self,
        kind: CombinerKind,
        inputs: Vec<Box<dyn ImageSource>>,
    ) -> Box<dyn ImageSource> {
        kind.build(&self.config, inputs)
    }

    /// Build a combiner of the configured kind.
    pub fn build_default_combiner(&self, inputs: Vec<Box<dyn ImageSource>>) -> Box<dyn ImageSource> {
        self.build_combiner(self.config.combiner, inputs)
    }

    /// Register a constructor for leaf sources named `name`, replacing any
    /// previous one.
    pub fn register_source(&mut self, name: impl Into<String>, factory: SourceFactory) {
        let name = name.into();
        debug!(kind = %name, "registered source kind");
        self.factories.insert(name, factory);
    }

    /// Instantiate a registered leaf kind.
    pub fn create_source(&self, name: &str) -> Result<Box<dyn ImageSource>, PipelineError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PipelineError::UnknownSourceKind(name.to_string()))
    }

    /// Registered leaf kinds, sorted.
    pub fn source_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Encoder for output tiles.
    pub fn encoder(&self) -> JpegTileEncoder {
        JpegTileEncoder::new()
    }

    /// Encode a finished tile as JPEG at the configured quality.
    pub fn encode_tile(&self, tile: &PixelBuffer) -> Result<Bytes, EncodeError> {
        self.encoder().encode(tile, self.config.jpeg_quality)
    }
}

// =============================================================================
// Tests
// =============================================================================
