//! Raster primitives: rects, scalar types, pixel buffers and remap tables.
//!
//! # Components
//!
//! - [`IRect`]: Integer image-space rectangle with level scaling
//! - [`ScalarType`] / [`Sample`]: Sample encodings and the generic kernel bound
//! - [`PixelBuffer`]: Multi-band tile with per-band null/min/max
//! - [`RemapTable`]: Native <-> `[0, 1]` normalization per scalar type

mod buffer;
mod rect;
mod remap;
pub(crate) mod scalar;

pub use buffer::{PixelBuffer, SampleData, TileStatus};
pub use rect::{level_factor, DPoint, IRect};
pub use remap::RemapTable;
pub use scalar::{Sample, ScalarType};
