//! Multi-band pixel buffers (tiles).
//!
//! A [`PixelBuffer`] owns a rectangular block of samples of one scalar type.
//! Bands are stored band-sequential in one contiguous vector: band `b`
//! occupies `[b * w * h, (b + 1) * w * h)`, rows left to right, top to
//! bottom.
//!
//! Sample coordinates passed to [`PixelBuffer::get_sample`] and friends are
//! local to the buffer (`0..width`, `0..height`), not image-space.

use super::rect::IRect;
use super::scalar::{dispatch_scalar, Sample, ScalarType};
use crate::error::RasterError;

/// Relative tolerance used when comparing float samples to a null value.
const FLOAT_NULL_EPSILON: f64 = 1e-7;

/// Coverage state of a buffer, recomputed by [`PixelBuffer::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// Allocated but never populated
    Null,
    /// Every sample is null
    Empty,
    /// Some samples are null
    Partial,
    /// No sample is null
    Full,
}

/// Backing storage, one variant per machine sample width.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    S16(Vec<i16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleData {
    fn zeroed(scalar: ScalarType, len: usize) -> Self {
        match scalar {
            ScalarType::U8 => SampleData::U8(vec![0; len]),
            ScalarType::U11 | ScalarType::U12 | ScalarType::U16 => SampleData::U16(vec![0; len]),
            ScalarType::S16 => SampleData::S16(vec![0; len]),
            ScalarType::F32 => SampleData::F32(vec![0.0; len]),
            ScalarType::F64 => SampleData::F64(vec![0.0; len]),
        }
    }

    fn len(&self) -> usize {
        match self {
            SampleData::U8(v) => v.len(),
            SampleData::U16(v) => v.len(),
            SampleData::S16(v) => v.len(),
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
        }
    }

    #[inline]
    fn get(&self, idx: usize) -> f64 {
        match self {
            SampleData::U8(v) => v[idx] as f64,
            SampleData::U16(v) => v[idx] as f64,
            SampleData::S16(v) => v[idx] as f64,
            SampleData::F32(v) => v[idx] as f64,
            SampleData::F64(v) => v[idx],
        }
    }

    #[inline]
    fn set(&mut self, idx: usize, value: f64) {
        match self {
            SampleData::U8(v) => v[idx] = u8::from_f64(value),
            SampleData::U16(v) => v[idx] = u16::from_f64(value),
            SampleData::S16(v) => v[idx] = i16::from_f64(value),
            SampleData::F32(v) => v[idx] = f32::from_f64(value),
            SampleData::F64(v) => v[idx] = value,
        }
    }

    fn same_storage(&self, scalar: ScalarType) -> bool {
        matches!(
            (self, scalar),
            (SampleData::U8(_), ScalarType::U8)
                | (
                    SampleData::U16(_),
                    ScalarType::U11 | ScalarType::U12 | ScalarType::U16
                )
                | (SampleData::S16(_), ScalarType::S16)
                | (SampleData::F32(_), ScalarType::F32)
                | (SampleData::F64(_), ScalarType::F64)
        )
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// A rectangular, multi-band block of samples plus per-band metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    rect: IRect,
    band_count: u32,
    scalar: ScalarType,
    data: SampleData,
    null_values: Vec<f64>,
    min_values: Vec<f64>,
    max_values: Vec<f64>,
    status: TileStatus,
}

impl PixelBuffer {
    /// Allocate a buffer covering `rect` with the scalar type's default
    /// null/min/max for every band. Status starts as [`TileStatus::Null`].
    pub fn new(rect: IRect, band_count: u32, scalar: ScalarType) -> Self {
        let bands = band_count as usize;
        Self {
            rect,
            band_count,
            scalar,
            data: SampleData::zeroed(scalar, rect.area() * bands),
            null_values: vec![scalar.default_null(); bands],
            min_values: vec![scalar.default_min(); bands],
            max_values: vec![scalar.default_max(); bands],
            status: TileStatus::Null,
        }
    }

    /// Allocate a buffer from signed dimensions.
    pub fn try_new(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        band_count: u32,
        scalar: ScalarType,
    ) -> Result<Self, RasterError> {
        Ok(Self::new(
            IRect::try_new(x, y, width, height)?,
            band_count,
            scalar,
        ))
    }

    /// Re-shape this buffer, keeping the existing storage when the sample
    /// count and storage type are unchanged.
    ///
    /// Band metadata is reset to the scalar defaults when the band count or
    /// scalar type changes. Status is reset to [`TileStatus::Null`].
    pub fn allocate(&mut self, rect: IRect, band_count: u32, scalar: ScalarType) {
        let len = rect.area() * band_count as usize;
        if self.data.len() != len || !self.data.same_storage(scalar) {
            self.data = SampleData::zeroed(scalar, len);
        }
        if band_count != self.band_count || scalar != self.scalar {
            let bands = band_count as usize;
            self.null_values = vec![scalar.default_null(); bands];
            self.min_values = vec![scalar.default_min(); bands];
            self.max_values = vec![scalar.default_max(); bands];
        }
        self.rect = rect;
        self.band_count = band_count;
        self.scalar = scalar;
        self.status = TileStatus::Null;
    }

    /// Move the buffer to a new origin. The extent must stay the same for
    /// the buffer to be reused, otherwise this reallocates.
    pub fn set_origin(&mut self, rect: IRect) {
        if rect.width == self.rect.width && rect.height == self.rect.height {
            self.rect = rect;
            self.status = TileStatus::Null;
        } else {
            self.allocate(rect, self.band_count, self.scalar);
        }
    }

    pub fn set_status(&mut self, status: TileStatus) {
        self.status = status;
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn rect(&self) -> IRect {
        self.rect
    }

    pub fn width(&self) -> u32 {
        self.rect.width
    }

    pub fn height(&self) -> u32 {
        self.rect.height
    }

    pub fn band_count(&self) -> u32 {
        self.band_count
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    pub fn status(&self) -> TileStatus {
        self.status
    }

    /// Samples per band.
    #[inline]
    pub fn band_len(&self) -> usize {
        self.rect.area()
    }

    /// Memory held by the samples.
    pub fn byte_size(&self) -> usize {
        self.data.len() * self.scalar.bytes_per_sample()
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    pub fn null_value(&self, band: u32) -> f64 {
        self.null_values[band as usize]
    }

    pub fn min_value(&self, band: u32) -> f64 {
        self.min_values[band as usize]
    }

    pub fn max_value(&self, band: u32) -> f64 {
        self.max_values[band as usize]
    }

    pub fn set_null_value(&mut self, band: u32, value: f64) {
        self.null_values[band as usize] = value;
    }

    pub fn set_min_value(&mut self, band: u32, value: f64) {
        self.min_values[band as usize] = value;
    }

    pub fn set_max_value(&mut self, band: u32, value: f64) {
        self.max_values[band as usize] = value;
    }

    /// Typed view of one band. `None` if `T` is not the storage type or the
    /// band does not exist.
    pub fn band<T: Sample>(&self, band: u32) -> Option<&[T]> {
        if band >= self.band_count {
            return None;
        }
        let len = self.band_len();
        let start = band as usize * len;
        T::slice(&self.data).map(|s| &s[start..start + len])
    }

    /// Mutable typed view of one band.
    pub fn band_mut<T: Sample>(&mut self, band: u32) -> Option<&mut [T]> {
        if band >= self.band_count {
            return None;
        }
        let len = self.band_len();
        let start = band as usize * len;
        T::slice_mut(&mut self.data).map(|s| &mut s[start..start + len])
    }

    // -------------------------------------------------------------------------
    // Sample Access
    // -------------------------------------------------------------------------

    fn index_of(&self, band: u32, x: i64, y: i64) -> Result<usize, RasterError> {
        if band >= self.band_count
            || x < 0
            || y < 0
            || x >= self.rect.width as i64
            || y >= self.rect.height as i64
        {
            return Err(RasterError::IndexError {
                band,
                x,
                y,
                bands: self.band_count,
                width: self.rect.width,
                height: self.rect.height,
            });
        }
        Ok(band as usize * self.band_len() + y as usize * self.rect.width as usize + x as usize)
    }

    /// Read one sample at buffer-local `(x, y)`.
    pub fn get_sample(&self, band: u32, x: i64, y: i64) -> Result<f64, RasterError> {
        let idx = self.index_of(band, x, y)?;
        Ok(self.data.get(idx))
    }

    /// Write one sample at buffer-local `(x, y)`. The value saturates to the
    /// storage type.
    pub fn set_sample(&mut self, band: u32, x: i64, y: i64, value: f64) -> Result<(), RasterError> {
        let idx = self.index_of(band, x, y)?;
        self.data.set(idx, value);
        Ok(())
    }

    /// Returns true if the sample at `(x, y)` equals the band's null value.
    pub fn is_null(&self, band: u32, x: i64, y: i64) -> Result<bool, RasterError> {
        let value = self.get_sample(band, x, y)?;
        Ok(self.is_null_value(band, value))
    }

    /// Compare a value to the band's null: exact for integral types,
    /// relative epsilon for floats.
    #[inline]
    pub fn is_null_value(&self, band: u32, value: f64) -> bool {
        let null = self.null_values[band as usize];
        if self.scalar.is_float() {
            let scale = value.abs().max(null.abs()).max(1.0);
            (value - null).abs() <= FLOAT_NULL_EPSILON * scale
        } else {
            value == null
        }
    }

    /// Sample at a band-relative linear index.
    #[inline]
    pub(crate) fn value_at(&self, band: u32, idx: usize) -> f64 {
        self.data.get(band as usize * self.band_len() + idx)
    }

    #[inline]
    pub(crate) fn set_value_at(&mut self, band: u32, idx: usize, value: f64) {
        let offset = band as usize * self.band_len();
        self.data.set(offset + idx, value);
    }

    /// Non-null sample at a band-relative linear index.
    #[inline]
    pub(crate) fn valid_at(&self, band: u32, idx: usize) -> Option<f64> {
        let value = self.value_at(band, idx);
        (!self.is_null_value(band, value)).then_some(value)
    }

    // -------------------------------------------------------------------------
    // Bulk Operations
    // -------------------------------------------------------------------------

    /// Fill one band with a constant.
    pub fn fill(&mut self, band: u32, value: f64) {
        let scalar = self.scalar;
        dispatch_scalar!(scalar, T => {
            if let Some(samples) = self.band_mut::<T>(band) {
                samples.fill(T::from_f64(value));
            }
        });
    }

    /// Fill every band with its null value and mark the buffer empty.
    pub fn make_blank(&mut self) {
        for band in 0..self.band_count {
            let null = self.null_values[band as usize];
            self.fill(band, null);
        }
        self.status = TileStatus::Empty;
    }

    /// Recompute [`TileStatus`] by scanning every sample.
    pub fn validate(&mut self) -> TileStatus {
        if self.rect.is_empty() || self.band_count == 0 {
            self.status = TileStatus::Null;
            return self.status;
        }
        let len = self.band_len();
        let mut nulls = 0usize;
        for band in 0..self.band_count {
            for idx in 0..len {
                if self.is_null_value(band, self.value_at(band, idx)) {
                    nulls += 1;
                }
            }
        }
        let total = len * self.band_count as usize;
        self.status = if nulls == 0 {
            TileStatus::Full
        } else if nulls == total {
            TileStatus::Empty
        } else {
            TileStatus::Partial
        };
        self.status
    }

    /// Copy the region of `src` that overlaps this buffer.
    ///
    /// Null samples in `src` become this buffer's null. Other samples are
    /// clamped to this buffer's scalar type. Bands beyond either count are
    /// left untouched. Status is not recomputed.
    pub fn load_tile(&mut self, src: &PixelBuffer) {
        let Some(overlap) = self.rect.intersection(&src.rect) else {
            return;
        };
        let bands = self.band_count.min(src.band_count);
        let dst_w = self.rect.width as usize;
        let src_w = src.rect.width as usize;
        let dx = (overlap.x - self.rect.x) as usize;
        let dy = (overlap.y - self.rect.y) as usize;
        let sx = (overlap.x - src.rect.x) as usize;
        let sy = (overlap.y - src.rect.y) as usize;
        let row_len = overlap.width as usize;

        for band in 0..bands {
            let dst_null = self.null_values[band as usize];
            for row in 0..overlap.height as usize {
                let src_row = (sy + row) * src_w + sx;
                let dst_row = (dy + row) * dst_w + dx;
                for col in 0..row_len {
                    let value = match src.valid_at(band, src_row + col) {
                        Some(v) => self.scalar.clamp_value(v),
                        None => dst_null,
                    };
                    self.set_value_at(band, dst_row + col, value);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
