//! # Raster Mosaic
//!
//! A pull-based tiled raster pipeline: image sources that produce pixel
//! tiles on demand, a bucketed tile cache that memoizes upstream work, and
//! combiners that merge overlapping sources of mixed bit depths.
//!
//! ## Features
//!
//! - **Resolution levels**: every request names a level; level `L` is the
//!   full-resolution grid reduced by `2^L`
//! - **Cross-type normalization**: per-type remap tables let 8-, 11-, 12-,
//!   16-bit and signed sources be combined numerically
//! - **Compositing**: first-valid mosaic, per-pixel maximum, fixed-weight
//!   blend and distance-feathered blend, all with the same null rules
//! - **Tile cache**: thread-safe LRU buckets with optional byte budget
//!
//! ## Architecture
//!
//! - [`raster`] - Rects, scalar types, pixel buffers, remap tables
//! - [`source`] - The [`ImageSource`] pull contract and leaf sources
//! - [`combine`] - Multi-input compositing nodes
//! - [`tile`] - Tile cache, caching decorator and JPEG output
//! - [`context`] - Graph construction around one shared cache
//! - [`config`] - Typed configuration (clap / serde)
//!
//! ## Example
//!
//! ```
//! use raster_mosaic::combine::{FirstValid, SimpleMosaic};
//! use raster_mosaic::raster::{IRect, ScalarType, TileStatus};
//! use raster_mosaic::source::{ImageSource, MemorySource};
//! use raster_mosaic::tile::CachingSource;
//!
//! let mut mosaic = SimpleMosaic::new(FirstValid::new());
//! mosaic.connect(MemorySource::filled(IRect::new(0, 0, 512, 512), 3, ScalarType::U8, 90.0));
//! mosaic.connect(MemorySource::filled(IRect::new(256, 0, 512, 512), 3, ScalarType::U8, 180.0));
//!
//! let mut root = CachingSource::new(mosaic);
//! root.initialize().unwrap();
//!
//! let tile = root.get_tile(&IRect::new(256, 0, 256, 256), 0).unwrap();
//! assert_eq!(tile.status(), TileStatus::Full);
//!
//! // Level 1 is half resolution
//! assert_eq!(root.bounding_rect(1), IRect::new(0, 0, 384, 256));
//! ```

pub mod combine;
pub mod config;
pub mod context;
pub mod error;
pub mod raster;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use combine::{
    BlendMosaic, Combiner, CombinerKind, Compositor, FeatherBlend, FeatherFalloff, FeatherMosaic,
    FirstValid, MaxMosaic, MaxValue, SimpleMosaic, WeightedBlend,
};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{EncodeError, PipelineError, RasterError};
pub use raster::{DPoint, IRect, PixelBuffer, RemapTable, ScalarType, TileStatus};
pub use source::{ImageSource, MemorySource, SharedSource};
pub use tile::{CachingSource, JpegTileEncoder, TileCache, TileCacheKey};
