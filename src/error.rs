use thiserror::Error;

use crate::raster::ScalarType;

/// Errors raised by pixel buffers and remap tables.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RasterError {
    /// A rectangle was requested with a negative extent
    #[error("Invalid rect: width {width}, height {height}")]
    InvalidRect { width: i64, height: i64 },

    /// Sample access outside the buffer
    #[error(
        "Sample index out of range: band {band}, ({x}, {y}) in a {bands}-band {width}x{height} buffer"
    )]
    IndexError {
        band: u32,
        x: i64,
        y: i64,
        bands: u32,
        width: u32,
        height: u32,
    },

    /// No remap table is registered for this scalar type
    #[error("Unsupported scalar type: {0:?}")]
    UnsupportedScalarType(ScalarType),
}

/// Errors raised while configuring or initializing a pipeline graph.
///
/// These surface from `initialize()`, never from `get_tile()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Combiner inputs disagree on band count
    #[error("Band count mismatch on input {input}: expected {expected}, found {found}")]
    BandCountMismatch {
        input: usize,
        expected: u32,
        found: u32,
    },

    /// A compositor that works in native units got mixed scalar types
    #[error("Scalar type mismatch on input {input}: expected {expected:?}, found {found:?}")]
    ScalarTypeMismatch {
        input: usize,
        expected: ScalarType,
        found: ScalarType,
    },

    /// More weights were configured than inputs are connected
    #[error("Weight count mismatch: {expected} inputs, {found} weights")]
    WeightCountMismatch { expected: usize, found: usize },

    /// Tracked cache size drifted from the sum of its entries
    #[error("Cache inconsistency: tracked {tracked} bytes, entries hold {actual} bytes")]
    CacheInconsistency { tracked: usize, actual: usize },

    /// No constructor is registered under this name
    #[error("Unknown source kind: {0}")]
    UnknownSourceKind(String),

    /// Buffer or remap error
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}

/// Errors that can occur when encoding an output tile.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// JPEG output needs 1 (gray) or 3 (RGB) bands
    #[error("Unsupported band count for JPEG output: {0}")]
    UnsupportedBandCount(u32),

    /// Buffer or remap error
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    /// The image encoder rejected the data
    #[error("Encode error: {message}")]
    Encode { message: String },
}
