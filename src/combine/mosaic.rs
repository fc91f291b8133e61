//! Selection compositors: first valid input, per-pixel maximum.

use tracing::debug;

use super::{Compositor, OutputLayout};
use crate::error::PipelineError;
use crate::raster::scalar::dispatch_scalar;
use crate::raster::{PixelBuffer, RemapTable, Sample};
use crate::source::ImageSource;

// =============================================================================
// First Valid
// =============================================================================

/// Each output pixel takes the first non-null input in connection order.
///
/// Inputs sharing the output scalar type are copied natively. Inputs of a
/// different integer type are converted through the remap tables, so an
/// 11-bit input feeding an 8-bit mosaic lands in the 8-bit range.
#[derive(Debug, Default)]
pub struct FirstValid {
    /// Per input: `Some` when the input must be remapped
    conversions: Vec<Option<&'static RemapTable>>,
    output_table: Option<&'static RemapTable>,
}

impl FirstValid {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_native(&self) -> bool {
        self.conversions.iter().all(Option::is_none)
    }
}

impl Compositor for FirstValid {
    fn prepare(
        &mut self,
        inputs: &[Box<dyn ImageSource>],
        layout: &OutputLayout,
    ) -> Result<(), PipelineError> {
        self.conversions.clear();
        self.output_table = None;
        for input in inputs {
            let scalar = input.output_scalar_type();
            if scalar == layout.scalar {
                self.conversions.push(None);
            } else {
                self.conversions.push(Some(RemapTable::for_scalar(scalar)?));
            }
        }
        if !self.is_native() {
            self.output_table = Some(RemapTable::for_scalar(layout.scalar)?);
            debug!(output = ?layout.scalar, "mosaic remaps heterogeneous inputs");
        }
        Ok(())
    }

    fn compose(&self, tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer, _level: u32) {
        match self.output_table {
            Some(output_table) if !self.is_native() => {
                first_valid_remapped(tiles, &self.conversions, output_table, output)
            }
            _ => dispatch_scalar!(output.scalar_type(), T => first_valid_native::<T>(tiles, output)),
        }
    }
}

fn first_valid_native<T: Sample>(tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer) {
    for band in 0..output.band_count() {
        let inputs: Vec<(&PixelBuffer, &[T])> = tiles
            .iter()
            .flatten()
            .filter_map(|tile| tile.band::<T>(band).map(|samples| (*tile, samples)))
            .collect();
        let Some(out) = output.band_mut::<T>(band) else {
            continue;
        };
        for (idx, sample) in out.iter_mut().enumerate() {
            for (tile, samples) in &inputs {
                let value = samples[idx];
                if !tile.is_null_value(band, value.to_f64()) {
                    *sample = value;
                    break;
                }
            }
        }
    }
}

fn first_valid_remapped(
    tiles: &[Option<&PixelBuffer>],
    conversions: &[Option<&'static RemapTable>],
    output_table: &RemapTable,
    output: &mut PixelBuffer,
) {
    let len = output.band_len();
    for band in 0..output.band_count() {
        for idx in 0..len {
            let hit = tiles.iter().zip(conversions).find_map(|(tile, conversion)| {
                let value = (*tile)?.valid_at(band, idx)?;
                Some(match conversion {
                    Some(table) => output_table.native_from_norm(table.norm_from_native(value)) as f64,
                    None => value,
                })
            });
            if let Some(value) = hit {
                output.set_value_at(band, idx, value);
            }
        }
    }
}

// =============================================================================
// Max Value
// =============================================================================

/// Each output pixel takes the largest non-null native value.
///
/// Comparing native values across encodings is meaningless, so every input
/// must share the output scalar type.
#[derive(Debug, Default, Clone)]
pub struct MaxValue {}

impl MaxValue {
    pub fn new() -> Self {
        Self {}
    }
}

impl Compositor for MaxValue {
    fn prepare(
        &mut self,
        inputs: &[Box<dyn ImageSource>],
        layout: &OutputLayout,
    ) -> Result<(), PipelineError> {
        for (index, input) in inputs.iter().enumerate() {
            let found = input.output_scalar_type();
            if found != layout.scalar {
                return Err(PipelineError::ScalarTypeMismatch {
                    input: index,
                    expected: layout.scalar,
                    found,
                });
            }
        }
        Ok(())
    }

    fn compose(&self, tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer, _level: u32) {
        dispatch_scalar!(output.scalar_type(), T => max_native::<T>(tiles, output))
    }
}

fn max_native<T: Sample>(tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer) {
    for band in 0..output.band_count() {
        let inputs: Vec<(&PixelBuffer, &[T])> = tiles
            .iter()
            .flatten()
            .filter_map(|tile| tile.band::<T>(band).map(|samples| (*tile, samples)))
            .collect();
        let Some(out) = output.band_mut::<T>(band) else {
            continue;
        };
        for (idx, sample) in out.iter_mut().enumerate() {
            let mut best: Option<T> = None;
            for (tile, samples) in &inputs {
                let value = samples[idx];
                if tile.is_null_value(band, value.to_f64()) {
                    continue;
                }
                best = match best {
                    Some(current) if current >= value => Some(current),
                    _ => Some(value),
                };
            }
            if let Some(value) = best {
                *sample = value;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
