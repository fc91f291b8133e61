//! Scalar sample encodings.
//!
//! [`ScalarType`] names the numeric encoding of one sample. Storage is
//! shared between encodings with the same machine width: 11-bit and 12-bit
//! imagery lives in `u16` samples and is distinguished only by its valid
//! range.
//!
//! [`Sample`] is the bound every numeric kernel in the crate is written
//! against, so one generic function serves all storage types.

use serde::{Deserialize, Serialize};

use super::buffer::SampleData;

/// Numeric encoding of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    U8,
    U11,
    U12,
    U16,
    S16,
    F32,
    F64,
}

impl ScalarType {
    /// Size of one stored sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            ScalarType::U8 => 1,
            ScalarType::U11 | ScalarType::U12 | ScalarType::U16 | ScalarType::S16 => 2,
            ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Smallest representable value.
    pub fn default_min(self) -> f64 {
        match self {
            ScalarType::U8 | ScalarType::U11 | ScalarType::U12 | ScalarType::U16 => 1.0,
            ScalarType::S16 => i16::MIN as f64 + 1.0,
            ScalarType::F32 => -(f32::MAX as f64),
            ScalarType::F64 => -f64::MAX,
        }
    }

    /// Largest representable value.
    pub fn default_max(self) -> f64 {
        match self {
            ScalarType::U8 => u8::MAX as f64,
            ScalarType::U11 => 2047.0,
            ScalarType::U12 => 4095.0,
            ScalarType::U16 => u16::MAX as f64,
            ScalarType::S16 => i16::MAX as f64,
            ScalarType::F32 => f32::MAX as f64,
            ScalarType::F64 => f64::MAX,
        }
    }

    /// Conventional "no data" value.
    ///
    /// Zero for unsigned imagery, the minimum for signed and float types.
    pub fn default_null(self) -> f64 {
        match self {
            ScalarType::U8 | ScalarType::U11 | ScalarType::U12 | ScalarType::U16 => 0.0,
            ScalarType::S16 => i16::MIN as f64,
            ScalarType::F32 => -(f32::MAX as f64),
            ScalarType::F64 => -f64::MAX,
        }
    }

    /// Clamp and round `value` so it is representable in this encoding.
    pub fn clamp_value(self, value: f64) -> f64 {
        if self.is_float() {
            return match self {
                ScalarType::F32 => value.clamp(-(f32::MAX as f64), f32::MAX as f64),
                _ => value,
            };
        }
        value.round().clamp(self.default_null().min(self.default_min()), self.default_max())
    }
}

// =============================================================================
// Sample Trait
// =============================================================================

/// A stored sample type.
pub trait Sample: Copy + PartialOrd + Send + Sync + 'static {
    fn to_f64(self) -> f64;

    /// Saturating conversion; integer targets round to nearest.
    fn from_f64(value: f64) -> Self;

    fn slice(data: &SampleData) -> Option<&[Self]>;

    fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]>;
}

macro_rules! impl_sample {
    ($t:ty, $variant:ident, int) => {
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }

            fn slice(data: &SampleData) -> Option<&[Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
    ($t:ty, $variant:ident, float) => {
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn slice(data: &SampleData) -> Option<&[Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_sample!(u8, U8, int);
impl_sample!(u16, U16, int);
impl_sample!(i16, S16, int);
impl_sample!(f32, F32, float);
impl_sample!(f64, F64, float);

/// Run `$body` with `$t` bound to the storage type of `$scalar`.
macro_rules! dispatch_scalar {
    ($scalar:expr, $t:ident => $body:expr) => {
        match $scalar {
            $crate::raster::ScalarType::U8 => {
                type $t = u8;
                $body
            }
            $crate::raster::ScalarType::U11
            | $crate::raster::ScalarType::U12
            | $crate::raster::ScalarType::U16 => {
                type $t = u16;
                $body
            }
            $crate::raster::ScalarType::S16 => {
                type $t = i16;
                $body
            }
            $crate::raster::ScalarType::F32 => {
                type $t = f32;
                $body
            }
            $crate::raster::ScalarType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_scalar;
