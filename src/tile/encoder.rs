//! JPEG tile encoder.
//!
//! Turns a finished output tile into JPEG bytes for a consumer.
//!
//! - 1-band tiles encode as grayscale, 3-band tiles as RGB.
//! - 8-bit samples are written as-is. Other integer types go through their
//!   remap table to the 8-bit range. Float tiles have no table and are
//!   rejected.
//! - Null samples are written as 0.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::EncodeError;
use crate::raster::{PixelBuffer, RemapTable, ScalarType};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes output tiles as JPEG.
///
/// # Example
///
/// ```
/// use raster_mosaic::raster::{IRect, PixelBuffer, ScalarType};
/// use raster_mosaic::tile::JpegTileEncoder;
///
/// let mut tile = PixelBuffer::new(IRect::new(0, 0, 16, 16), 1, ScalarType::U8);
/// tile.fill(0, 128.0);
///
/// let jpeg = JpegTileEncoder::new().encode(&tile, 85).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JpegTileEncoder {}

impl JpegTileEncoder {
    pub fn new() -> Self {
        Self {}
    }

    /// Encode `tile` at the given quality (clamped to 1-100).
    pub fn encode(&self, tile: &PixelBuffer, quality: u8) -> Result<Bytes, EncodeError> {
        let quality = clamp_quality(quality);
        let color = match tile.band_count() {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            n => return Err(EncodeError::UnsupportedBandCount(n)),
        };

        let pixels = to_interleaved_u8(tile)?;
        let mut output = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut output, quality)
            .write_image(&pixels, tile.width(), tile.height(), color)
            .map_err(|e| EncodeError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output.into_inner()))
    }

    /// Encode at [`DEFAULT_JPEG_QUALITY`].
    pub fn encode_default(&self, tile: &PixelBuffer) -> Result<Bytes, EncodeError> {
        self.encode(tile, DEFAULT_JPEG_QUALITY)
    }
}

/// Band-interleaved 8-bit samples, nulls as 0.
fn to_interleaved_u8(tile: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
    let bands = tile.band_count() as usize;
    let len = tile.band_len();
    let scalar = tile.scalar_type();
    let remap = if scalar == ScalarType::U8 {
        None
    } else {
        Some((
            RemapTable::for_scalar(scalar)?,
            RemapTable::for_scalar(ScalarType::U8)?,
        ))
    };

    let mut pixels = vec![0u8; len * bands];
    for band in 0..tile.band_count() {
        for idx in 0..len {
            let Some(value) = tile.valid_at(band, idx) else {
                continue;
            };
            let out = match remap {
                None => value as u8,
                Some((native, eight_bit)) => {
                    eight_bit.native_from_norm(native.norm_from_native(value)) as u8
                }
            };
            pixels[idx * bands + band as usize] = out;
        }
    }
    Ok(pixels)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
