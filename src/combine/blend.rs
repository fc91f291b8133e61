//! Fixed-weight blending in normalized space.

use tracing::debug;

use super::{Compositor, OutputLayout};
use crate::error::PipelineError;
use crate::raster::{PixelBuffer, RemapTable};
use crate::source::ImageSource;

/// Running convex combination of normalized samples.
///
/// Falls back to the unweighted mean when every contributing weight is zero.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BlendAccumulator {
    weighted_sum: f64,
    weight_sum: f64,
    plain_sum: f64,
    count: u32,
}

impl BlendAccumulator {
    #[inline]
    pub(crate) fn add(&mut self, norm: f64, weight: f64) {
        self.weighted_sum += norm * weight;
        self.weight_sum += weight;
        self.plain_sum += norm;
        self.count += 1;
    }

    /// `None` when nothing contributed.
    #[inline]
    pub(crate) fn finish(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else if self.weight_sum > 0.0 {
            Some(self.weighted_sum / self.weight_sum)
        } else {
            Some(self.plain_sum / self.count as f64)
        }
    }
}

/// Remap tables for every input plus the output.
pub(crate) fn remap_tables(
    inputs: &[Box<dyn ImageSource>],
    layout: &OutputLayout,
) -> Result<(Vec<&'static RemapTable>, &'static RemapTable), PipelineError> {
    let tables = inputs
        .iter()
        .map(|input| RemapTable::for_scalar(input.output_scalar_type()))
        .collect::<Result<Vec<_>, _>>()?;
    let output = RemapTable::for_scalar(layout.scalar)?;
    Ok((tables, output))
}

// =============================================================================
// Weighted Blend
// =============================================================================

/// Blends overlapping inputs with one fixed weight per input.
///
/// Each non-null sample is normalized through its input's remap table, the
/// weighted mean is taken over the non-null inputs at that pixel, and the
/// result is mapped back through the output table. Missing weights count as
/// `1.0`.
///
/// # Example
///
/// ```
/// use raster_mosaic::combine::{BlendMosaic, WeightedBlend};
/// use raster_mosaic::raster::{IRect, ScalarType};
/// use raster_mosaic::source::{ImageSource, MemorySource};
///
/// let rect = IRect::new(0, 0, 2, 2);
/// let mut blend = BlendMosaic::new(WeightedBlend::new());
/// blend.connect(MemorySource::filled(rect, 1, ScalarType::U8, 100.0));
/// blend.connect(MemorySource::filled(rect, 1, ScalarType::U8, 200.0));
///
/// let tile = blend.get_tile(&rect, 0).unwrap();
/// assert_eq!(tile.get_sample(0, 0, 0).unwrap(), 150.0);
/// ```
#[derive(Debug, Default)]
pub struct WeightedBlend {
    weights: Vec<f64>,
    effective: Vec<f64>,
    tables: Vec<&'static RemapTable>,
    output_table: Option<&'static RemapTable>,
}

impl WeightedBlend {
    /// Equal weights for every input.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: Vec<f64>) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Replace the weights. Takes effect at the next initialize.
    pub fn set_weights(&mut self, weights: Vec<f64>) {
        self.weights = weights;
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Weight applied to input `index` after the last initialize.
    pub fn effective_weight(&self, index: usize) -> Option<f64> {
        self.effective.get(index).copied()
    }

    /// Rescale weights so the smallest becomes 0 and the largest 1.
    /// Identical weights all become 1.
    pub fn normalize_weights(&mut self) {
        let (min, max) = self
            .weights
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &w| {
                (lo.min(w), hi.max(w))
            });
        let range = max - min;
        for weight in &mut self.weights {
            *weight = if range > 0.0 { (*weight - min) / range } else { 1.0 };
        }
    }
}

impl Compositor for WeightedBlend {
    fn prepare(
        &mut self,
        inputs: &[Box<dyn ImageSource>],
        layout: &OutputLayout,
    ) -> Result<(), PipelineError> {
        if self.weights.len() > inputs.len() {
            return Err(PipelineError::WeightCountMismatch {
                expected: inputs.len(),
                found: self.weights.len(),
            });
        }
        let (tables, output_table) = remap_tables(inputs, layout)?;

        self.effective = self.weights.clone();
        self.effective.resize(inputs.len(), 1.0);
        self.tables = tables;
        self.output_table = Some(output_table);
        debug!(weights = ?self.effective, "weighted blend prepared");
        Ok(())
    }

    fn compose(&self, tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer, _level: u32) {
        let Some(output_table) = self.output_table else {
            return;
        };
        let len = output.band_len();
        for band in 0..output.band_count() {
            for idx in 0..len {
                let mut acc = BlendAccumulator::default();
                for (i, tile) in tiles.iter().enumerate() {
                    let Some(value) = tile.and_then(|t| t.valid_at(band, idx)) else {
                        continue;
                    };
                    acc.add(self.tables[i].norm_from_native(value), self.effective[i]);
                }
                if let Some(norm) = acc.finish() {
                    output.set_value_at(band, idx, output_table.native_from_norm(norm) as f64);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
