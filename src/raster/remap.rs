//! Native <-> normalized sample remapping.
//!
//! Each integer scalar type has one immutable [`RemapTable`] for the life of
//! the process. The table maps a native sample to `[0, 1]` by its index in
//! the type's range (`native - offset`) divided by `entry_count - 1`.
//!
//! Index 0 is the conventional null for every table (0 for unsigned
//! imagery, `i16::MIN` for signed 16-bit), so [`RemapTable::native_from_norm`]
//! never returns index 0 for a strictly positive input.
//!
//! Float types have no table and report
//! [`RasterError::UnsupportedScalarType`].

use std::sync::OnceLock;

use super::scalar::ScalarType;
use crate::error::RasterError;

static U8_TABLE: OnceLock<RemapTable> = OnceLock::new();
static U11_TABLE: OnceLock<RemapTable> = OnceLock::new();
static U12_TABLE: OnceLock<RemapTable> = OnceLock::new();
static U16_TABLE: OnceLock<RemapTable> = OnceLock::new();
static S16_TABLE: OnceLock<RemapTable> = OnceLock::new();

/// Precomputed mapping between native samples and normalized values.
#[derive(Debug)]
pub struct RemapTable {
    scalar: ScalarType,
    entry_count: usize,
    offset: i64,
    normalizer: f64,
    table: Vec<f64>,
}

impl RemapTable {
    /// The shared table for `scalar`.
    pub fn for_scalar(scalar: ScalarType) -> Result<&'static RemapTable, RasterError> {
        let table = match scalar {
            ScalarType::U8 => U8_TABLE.get_or_init(|| Self::build(scalar, 256, 0)),
            ScalarType::U11 => U11_TABLE.get_or_init(|| Self::build(scalar, 2048, 0)),
            ScalarType::U12 => U12_TABLE.get_or_init(|| Self::build(scalar, 4096, 0)),
            ScalarType::U16 => U16_TABLE.get_or_init(|| Self::build(scalar, 65536, 0)),
            ScalarType::S16 => {
                S16_TABLE.get_or_init(|| Self::build(scalar, 65536, i16::MIN as i64))
            }
            ScalarType::F32 | ScalarType::F64 => {
                return Err(RasterError::UnsupportedScalarType(scalar))
            }
        };
        Ok(table)
    }

    /// Returns true if a table exists for `scalar`.
    pub fn is_supported(scalar: ScalarType) -> bool {
        !scalar.is_float()
    }

    fn build(scalar: ScalarType, entry_count: usize, offset: i64) -> Self {
        let normalizer = (entry_count - 1) as f64;
        let table = (0..entry_count).map(|i| i as f64 / normalizer).collect();
        Self {
            scalar,
            entry_count,
            offset,
            normalizer,
            table,
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    /// Map a native sample to `[0, 1]`.
    ///
    /// Below the range maps to `0.0`, at or above `entry_count` to `1.0`.
    pub fn norm_from_native(&self, pixel: f64) -> f64 {
        let index = pixel - self.offset as f64;
        if index.is_nan() || index < 0.0 {
            return 0.0;
        }
        if index >= self.entry_count as f64 {
            return 1.0;
        }
        let slot = (index.round() as usize).min(self.entry_count - 1);
        self.table[slot]
    }

    /// Map a normalized value back to a native sample.
    ///
    /// `norm <= 0` maps to index 0 (the null). Anything strictly positive
    /// maps to index 1 or above, even when it rounds to 0.
    pub fn native_from_norm(&self, norm: f64) -> i32 {
        if !(norm > 0.0) {
            return self.offset as i32;
        }
        let mut index = (norm * self.normalizer).round();
        if index > self.normalizer {
            index = self.normalizer;
        }
        if index < 1.0 {
            index = 1.0;
        }
        (index as i64 + self.offset) as i32
    }
}

// =============================================================================
// Tests
// =============================================================================
