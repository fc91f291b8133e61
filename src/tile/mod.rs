//! Tile caching and output encoding.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Consumer                   │
//! └────────────────────┬────────────────────┘
//!                      │ get_tile(rect, level)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            CachingSource                │
//! │  ┌──────────────┐                       │
//! │  │  TileCache   │  fixed-size tiles,    │
//! │  │  (buckets)   │  keyed by origin +    │
//! │  │              │  context + level      │
//! │  └──────────────┘                       │
//! └────────────────────┬────────────────────┘
//!                      │ misses only
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        Upstream ImageSource graph       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCache`]: Bucketed, thread-safe store of produced tiles
//! - [`TileCacheKey`]: Composite key (origin, context, level)
//! - [`CachingSource`]: Decorator that answers from the cache before pulling upstream
//! - [`JpegTileEncoder`]: Encodes finished tiles for consumers

mod cache;
mod caching_source;
mod encoder;

pub use cache::{CacheStats, TileCache, TileCacheKey, DEFAULT_BUCKET_COUNT};
pub use caching_source::{CachingSource, DEFAULT_TILE_SIZE};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
