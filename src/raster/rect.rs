//! Image-space rectangles and points.
//!
//! `IRect` stores its extent as `u32`, so a negative width or height cannot
//! exist once constructed. Values coming from untrusted signed arithmetic go
//! through [`IRect::try_new`], which reports [`RasterError::InvalidRect`].
//!
//! A zero-area rect means "no tile requested". Every `get_tile` treats it as
//! a no-op returning no data.

use serde::{Deserialize, Serialize};

use crate::error::RasterError;

/// Integer image-space rectangle (origin plus extent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl IRect {
    /// Create a rect from an origin and a non-negative extent.
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rect from signed dimensions, rejecting negative extents.
    pub fn try_new(x: i64, y: i64, width: i64, height: i64) -> Result<Self, RasterError> {
        if width < 0 || height < 0 || width > u32::MAX as i64 || height > u32::MAX as i64 {
            return Err(RasterError::InvalidRect { width, height });
        }
        Ok(Self::new(x, y, width as u32, height as u32))
    }

    /// Create a rect from inclusive-exclusive corners.
    pub fn from_corners(x0: i64, y0: i64, x1: i64, y1: i64) -> Result<Self, RasterError> {
        Self::try_new(x0, y0, x1 - x0, y1 - y0)
    }

    /// The empty rect at the origin.
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if `(x, y)` lies inside the rect.
    #[inline]
    pub fn contains_point(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Returns true if `other` lies entirely inside this rect.
    pub fn contains(&self, other: &IRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlapping region, or `None` if the rects share no pixel.
    pub fn intersection(&self, other: &IRect) -> Option<IRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(IRect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    #[inline]
    pub fn intersects(&self, other: &IRect) -> bool {
        self.intersection(other).is_some()
    }

    /// Smallest rect covering both. Empty rects are ignored.
    pub fn union(&self, other: &IRect) -> IRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        IRect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Scale a level-0 rect to a reduced-resolution level.
    ///
    /// Each level halves the resolution. The origin is floored and the far
    /// edge ceiled so the result still covers the same ground area.
    pub fn at_level(&self, level: u32) -> IRect {
        if level == 0 || self.is_empty() {
            return *self;
        }
        let factor = level_factor(level);
        let x0 = self.x.div_euclid(factor);
        let y0 = self.y.div_euclid(factor);
        let x1 = ceil_div(self.right(), factor);
        let y1 = ceil_div(self.bottom(), factor);
        IRect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// Integer scale between level 0 and `level`.
#[inline]
pub fn level_factor(level: u32) -> i64 {
    1i64 << level.min(62)
}

#[inline]
fn ceil_div(value: i64, divisor: i64) -> i64 {
    -((-value).div_euclid(divisor))
}

/// Floating image-space point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DPoint {
    pub x: f64,
    pub y: f64,
}

impl DPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn dot(&self, other: &DPoint) -> f64 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    #[inline]
    pub fn sub(&self, other: &DPoint) -> DPoint {
        DPoint::new(self.x - other.x, self.y - other.y)
    }

    #[inline]
    pub fn scale(&self, factor: f64) -> DPoint {
        DPoint::new(self.x * factor, self.y * factor)
    }
}

// =============================================================================
// Tests
// =============================================================================
