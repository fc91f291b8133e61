//! Pipeline configuration.
//!
//! [`PipelineConfig`] is a flat set of named options consumed by
//! [`crate::context::PipelineContext`]. It can be:
//! - embedded in a host CLI via `#[command(flatten)]` (clap)
//! - set through environment variables with the `RASTER_` prefix
//! - loaded from JSON (serde); missing keys take their defaults
//!
//! # Example
//!
//! ```
//! use raster_mosaic::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{ "bucket_count": 4, "weights": [1.0, 2.0] }"#).unwrap();
//! assert_eq!(config.bucket_count, 4);
//! assert_eq!(config.tile_width, 256);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment Variables
//!
//! - `RASTER_CACHING_ENABLED` - Serve tiles through the cache (default: true)
//! - `RASTER_TILE_WIDTH` / `RASTER_TILE_HEIGHT` - Fixed cache tile size (default: 256)
//! - `RASTER_BUCKET_COUNT` - Cache buckets (default: 10)
//! - `RASTER_CACHE_CAPACITY` - Cache byte budget (default: unbounded)
//! - `RASTER_COMBINER` - Compositing strategy (default: simple-mosaic)
//! - `RASTER_WEIGHTS` - Comma-separated blend weights
//! - `RASTER_FEATHER_FALLOFF` - `linear` or `smooth` (default: linear)
//! - `RASTER_FEATHER_MIN_WEIGHT` - Weight floor for valid samples (default: 1e-6)
//! - `RASTER_JPEG_QUALITY` - Output JPEG quality (default: 80)

use serde::{Deserialize, Serialize};

use crate::combine::{CombinerKind, FeatherFalloff};
use crate::tile::{DEFAULT_BUCKET_COUNT, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_SIZE};

/// Default weight floor for feathering.
pub const DEFAULT_FEATHER_MIN_WEIGHT: f64 = 1e-6;

// =============================================================================
// Pipeline Config
// =============================================================================

#[derive(clap::Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // =========================================================================
    // Cache
    // =========================================================================
    /// Serve tiles through the tile cache.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "RASTER_CACHING_ENABLED"
    )]
    pub caching_enabled: bool,

    /// Fixed cache tile width in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "RASTER_TILE_WIDTH")]
    pub tile_width: u32,

    /// Fixed cache tile height in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "RASTER_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Number of independently locked LRU buckets.
    #[arg(long, default_value_t = DEFAULT_BUCKET_COUNT, env = "RASTER_BUCKET_COUNT")]
    pub bucket_count: u32,

    /// Byte budget for cached tiles. Unbounded if not set.
    #[arg(long, env = "RASTER_CACHE_CAPACITY")]
    pub cache_capacity: Option<usize>,

    // =========================================================================
    // Compositing
    // =========================================================================
    /// Compositing strategy for multi-input nodes.
    #[arg(
        long,
        value_enum,
        default_value_t = CombinerKind::SimpleMosaic,
        env = "RASTER_COMBINER"
    )]
    pub combiner: CombinerKind,

    /// Per-input blend weights, in input order. Missing weights are 1.0.
    #[arg(long, value_delimiter = ',', env = "RASTER_WEIGHTS")]
    pub weights: Vec<f64>,

    /// Feather weight decay toward the valid-region edge.
    #[arg(
        long,
        value_enum,
        default_value_t = FeatherFalloff::Linear,
        env = "RASTER_FEATHER_FALLOFF"
    )]
    pub feather_falloff: FeatherFalloff,

    /// Smallest weight given to a valid sample when feathering.
    #[arg(
        long,
        default_value_t = DEFAULT_FEATHER_MIN_WEIGHT,
        env = "RASTER_FEATHER_MIN_WEIGHT"
    )]
    pub feather_min_weight: f64,

    // =========================================================================
    // Output
    // =========================================================================
    /// JPEG quality for encoded output tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "RASTER_JPEG_QUALITY")]
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            caching_enabled: true,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            bucket_count: DEFAULT_BUCKET_COUNT,
            cache_capacity: None,
            combiner: CombinerKind::SimpleMosaic,
            weights: Vec::new(),
            feather_falloff: FeatherFalloff::Linear,
            feather_min_weight: DEFAULT_FEATHER_MIN_WEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document. Absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_width, self.tile_height
            ));
        }

        if self.bucket_count == 0 {
            return Err("bucket_count must be greater than 0".to_string());
        }

        if self.cache_capacity == Some(0) {
            return Err(
                "cache_capacity must be greater than 0; omit it for an unbounded cache"
                    .to_string(),
            );
        }

        if let Some((index, weight)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(format!(
                "weight {index} must be finite and non-negative, got {weight}"
            ));
        }

        if !(self.feather_min_weight.is_finite() && self.feather_min_weight > 0.0) {
            return Err("feather_min_weight must be a positive number".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Fixed cache tile size as `(width, height)`.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }
}

// =============================================================================
// Tests
// =============================================================================
