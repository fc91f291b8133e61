//! The pull contract shared by every pipeline node.
//!
//! This module defines the [`ImageSource`] trait. A consumer asks the root
//! of a graph for a rect at a resolution level, and each node recursively
//! pulls the same rect/level from its inputs.
//!
//! # Implementations
//!
//! - [`MemorySource`]: In-memory leaf with a lazily built reduced-resolution pyramid
//! - [`SharedSource`]: Mutex-serialized handle for a node with several consumers
//! - [`crate::tile::CachingSource`]: Tile-cache decorator
//! - [`crate::combine::Combiner`]: Multi-input compositing node
//!
//! Format readers live outside this crate and implement [`ImageSource`] as
//! leaves.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::raster::{DPoint, IRect, PixelBuffer, ScalarType};

mod memory;
mod shared;

pub use memory::MemorySource;
pub use shared::SharedSource;

// =============================================================================
// ImageSource Trait
// =============================================================================

/// A node in the pull-based tile graph.
///
/// `get_tile` takes `&mut self` because nodes reuse an internal output
/// buffer between calls. Callers that need a tile to survive the next call
/// on the same node should keep their own `Arc` (the node then allocates a
/// fresh buffer) or copy the data.
pub trait ImageSource: Send {
    /// Produce the tile covering `rect` at `level`.
    ///
    /// Returns `None` only when the request is empty or entirely outside
    /// this source's coverage. Partial coverage yields a buffer whose
    /// uncovered samples are null and whose status is
    /// [`crate::raster::TileStatus::Partial`] or `Empty`.
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>>;

    fn number_of_output_bands(&self) -> u32;

    fn output_scalar_type(&self) -> ScalarType;

    fn null_pixel_value(&self, band: u32) -> f64;

    fn min_pixel_value(&self, band: u32) -> f64;

    fn max_pixel_value(&self, band: u32) -> f64;

    /// Recompute derived state from the current inputs. Idempotent.
    fn initialize(&mut self) -> Result<(), PipelineError>;

    /// Extent of producible data at `level`.
    fn bounding_rect(&self, level: u32) -> IRect;

    /// Valid-data polygon in level-0 pixel space.
    ///
    /// Defaults to the pixel-center corners of the level-0 bounding rect.
    fn valid_vertices(&self) -> Vec<DPoint> {
        rect_vertices(&self.bounding_rect(0))
    }

    /// Number of connected inputs (0 for leaves).
    fn number_of_inputs(&self) -> usize {
        0
    }
}

impl<S: ImageSource + ?Sized> ImageSource for Box<S> {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        (**self).get_tile(rect, level)
    }

    fn number_of_output_bands(&self) -> u32 {
        (**self).number_of_output_bands()
    }

    fn output_scalar_type(&self) -> ScalarType {
        (**self).output_scalar_type()
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        (**self).null_pixel_value(band)
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        (**self).min_pixel_value(band)
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        (**self).max_pixel_value(band)
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        (**self).initialize()
    }

    fn bounding_rect(&self, level: u32) -> IRect {
        (**self).bounding_rect(level)
    }

    fn valid_vertices(&self) -> Vec<DPoint> {
        (**self).valid_vertices()
    }

    fn number_of_inputs(&self) -> usize {
        (**self).number_of_inputs()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Pixel-center corners of `rect`, clockwise from upper left.
pub fn rect_vertices(rect: &IRect) -> Vec<DPoint> {
    if rect.is_empty() {
        return Vec::new();
    }
    let x0 = rect.x as f64;
    let y0 = rect.y as f64;
    let x1 = (rect.right() - 1) as f64;
    let y1 = (rect.bottom() - 1) as f64;
    vec![
        DPoint::new(x0, y0),
        DPoint::new(x1, y0),
        DPoint::new(x1, y1),
        DPoint::new(x0, y1),
    ]
}

/// Take back the node's previous output buffer if no consumer still holds
/// it, re-shaped for the next request. Allocates otherwise.
pub(crate) fn recycle_tile(
    slot: &mut Option<Arc<PixelBuffer>>,
    rect: IRect,
    band_count: u32,
    scalar: ScalarType,
) -> PixelBuffer {
    match slot.take().and_then(|tile| Arc::try_unwrap(tile).ok()) {
        Some(mut tile) => {
            tile.allocate(rect, band_count, scalar);
            tile
        }
        None => PixelBuffer::new(rect, band_count, scalar),
    }
}

/// Publish a finished buffer, keeping a handle for reuse.
pub(crate) fn publish_tile(slot: &mut Option<Arc<PixelBuffer>>, tile: PixelBuffer) -> Arc<PixelBuffer> {
    let tile = Arc::new(tile);
    *slot = Some(Arc::clone(&tile));
    tile
}
