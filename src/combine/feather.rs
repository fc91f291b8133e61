//! Distance-to-edge feathered blending.
//!
//! Each input gets a local frame from its valid-data polygon: a center and
//! two orthogonal unit axes, each with the half-extent of the polygon along
//! it. A point's weight falls from 1 at the center to 0 at the extent along
//! whichever axis it is closer to leaving.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::blend::{remap_tables, BlendAccumulator};
use super::{Compositor, OutputLayout};
use crate::error::PipelineError;
use crate::raster::{level_factor, DPoint, PixelBuffer, RemapTable};
use crate::source::{rect_vertices, ImageSource};

/// Lower bound on a non-null sample's weight.
pub const DEFAULT_MIN_WEIGHT: f64 = 1e-6;

const GEOMETRY_EPSILON: f64 = 1e-9;

/// Shape of the weight decay toward a polygon edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FeatherFalloff {
    /// Weight proportional to the normalized distance from the edge
    #[default]
    Linear,
    /// Smoothstep of the linear weight; flat at the center and at the edge
    Smooth,
}

impl FeatherFalloff {
    #[inline]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FeatherFalloff::Linear => t,
            FeatherFalloff::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

// =============================================================================
// Feather Geometry
// =============================================================================

/// Local frame derived from a valid-data polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatherGeometry {
    center: DPoint,
    axis1: DPoint,
    axis2: DPoint,
    axis1_length: f64,
    axis2_length: f64,
    vertices: Vec<DPoint>,
}

impl FeatherGeometry {
    /// Build the frame for `vertices` (level-0 pixel space, open ring).
    ///
    /// The first axis follows the first non-zero edge, the second is its
    /// perpendicular. Returns `None` for fewer than three vertices or a
    /// polygon with no extent along either axis.
    pub fn from_vertices(vertices: Vec<DPoint>) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let n = vertices.len() as f64;
        let (sx, sy) = vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), v| (sx + v.x, sy + v.y));
        let center = DPoint::new(sx / n, sy / n);

        let edge = vertices
            .iter()
            .zip(vertices.iter().cycle().skip(1))
            .map(|(a, b)| b.sub(a))
            .find(|e| e.length() > GEOMETRY_EPSILON)?;
        let axis1 = edge.scale(1.0 / edge.length());
        let axis2 = DPoint::new(-axis1.y, axis1.x);

        let extent = |axis: &DPoint| {
            vertices
                .iter()
                .map(|v| v.sub(&center).dot(axis).abs())
                .fold(0.0, f64::max)
        };
        let axis1_length = extent(&axis1);
        let axis2_length = extent(&axis2);
        if axis1_length <= GEOMETRY_EPSILON || axis2_length <= GEOMETRY_EPSILON {
            return None;
        }

        Some(Self {
            center,
            axis1,
            axis2,
            axis1_length,
            axis2_length,
            vertices,
        })
    }

    pub fn center(&self) -> DPoint {
        self.center
    }

    pub fn axes(&self) -> (DPoint, DPoint) {
        (self.axis1, self.axis2)
    }

    pub fn axis_lengths(&self) -> (f64, f64) {
        (self.axis1_length, self.axis2_length)
    }

    pub fn vertices(&self) -> &[DPoint] {
        &self.vertices
    }

    /// Falloff weight at a level-0 point, in `[0, 1]`.
    pub fn weight(&self, point: DPoint, falloff: FeatherFalloff) -> f64 {
        let d = point.sub(&self.center);
        let along1 = d.dot(&self.axis1).abs() / self.axis1_length;
        let along2 = d.dot(&self.axis2).abs() / self.axis2_length;
        falloff.apply(1.0 - along1.max(along2))
    }
}

// =============================================================================
// Feather Blend
// =============================================================================

/// Blends overlapping inputs with a per-pixel weight from each input's
/// [`FeatherGeometry`].
///
/// The weights of the non-null inputs at a pixel are normalized to sum to 1,
/// so the result is always a convex combination of the inputs.
#[derive(Debug)]
pub struct FeatherBlend {
    falloff: FeatherFalloff,
    min_weight: f64,
    /// Per input; `None` weighs 1 everywhere
    geometries: Vec<Option<FeatherGeometry>>,
    tables: Vec<&'static RemapTable>,
    output_table: Option<&'static RemapTable>,
}

impl Default for FeatherBlend {
    fn default() -> Self {
        Self {
            falloff: FeatherFalloff::default(),
            min_weight: DEFAULT_MIN_WEIGHT,
            geometries: Vec::new(),
            tables: Vec::new(),
            output_table: None,
        }
    }
}

impl FeatherBlend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_falloff(mut self, falloff: FeatherFalloff) -> Self {
        self.falloff = falloff;
        self
    }

    /// Floor for non-null weights. Non-positive values are replaced by
    /// [`DEFAULT_MIN_WEIGHT`].
    pub fn with_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = if min_weight > 0.0 {
            min_weight
        } else {
            DEFAULT_MIN_WEIGHT
        };
        self
    }

    pub fn falloff(&self) -> FeatherFalloff {
        self.falloff
    }

    pub fn min_weight(&self) -> f64 {
        self.min_weight
    }

    /// Geometry of input `index` after the last initialize.
    pub fn geometry(&self, index: usize) -> Option<&FeatherGeometry> {
        self.geometries.get(index).and_then(Option::as_ref)
    }

    /// Raw weight of input `index` at a level-0 point.
    pub fn compute_weight(&self, index: usize, point: DPoint) -> f64 {
        let weight = match self.geometry(index) {
            Some(geometry) => geometry.weight(point, self.falloff),
            None => 1.0,
        };
        weight.max(self.min_weight)
    }

    /// Effective weights at `point` for the inputs flagged in `valid`.
    /// Invalid inputs get 0; the rest sum to 1 when any is valid.
    pub fn normalized_weights(&self, point: DPoint, valid: &[bool]) -> Vec<f64> {
        let mut weights: Vec<f64> = valid
            .iter()
            .enumerate()
            .map(|(i, &ok)| if ok { self.compute_weight(i, point) } else { 0.0 })
            .collect();
        let sum: f64 = weights.iter().sum();
        if sum > 0.0 {
            weights.iter_mut().for_each(|w| *w /= sum);
        }
        weights
    }

    fn build_geometry(index: usize, input: &dyn ImageSource) -> Option<FeatherGeometry> {
        FeatherGeometry::from_vertices(input.valid_vertices())
            .or_else(|| FeatherGeometry::from_vertices(rect_vertices(&input.bounding_rect(0))))
            .or_else(|| {
                warn!(input = index, "degenerate valid region, feather weight fixed at 1");
                None
            })
    }
}

/// Level-0 position of the center of pixel `(x, y)` at `level`.
#[inline]
pub(crate) fn level_zero_point(x: i64, y: i64, level: u32) -> DPoint {
    let factor = level_factor(level) as f64;
    let offset = (factor - 1.0) / 2.0;
    DPoint::new(x as f64 * factor + offset, y as f64 * factor + offset)
}

impl Compositor for FeatherBlend {
    fn prepare(
        &mut self,
        inputs: &[Box<dyn ImageSource>],
        layout: &OutputLayout,
    ) -> Result<(), PipelineError> {
        let (tables, output_table) = remap_tables(inputs, layout)?;
        self.geometries = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| Self::build_geometry(i, input.as_ref()))
            .collect();
        self.tables = tables;
        self.output_table = Some(output_table);
        debug!(
            inputs = inputs.len(),
            falloff = ?self.falloff,
            "feather geometry computed"
        );
        Ok(())
    }

    fn compose(&self, tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer, level: u32) {
        let Some(output_table) = self.output_table else {
            return;
        };
        let rect = output.rect();
        let width = rect.width as usize;
        let mut weights = vec![0.0; tiles.len()];

        for row in 0..rect.height as usize {
            for col in 0..width {
                let idx = row * width + col;
                let point = level_zero_point(rect.x + col as i64, rect.y + row as i64, level);
                for (i, tile) in tiles.iter().enumerate() {
                    if tile.is_some() {
                        weights[i] = self.compute_weight(i, point);
                    }
                }

                for band in 0..output.band_count() {
                    let mut acc = BlendAccumulator::default();
                    for (i, tile) in tiles.iter().enumerate() {
                        let Some(value) = tile.and_then(|t| t.valid_at(band, idx)) else {
                            continue;
                        };
                        acc.add(self.tables[i].norm_from_native(value), weights[i]);
                    }
                    if let Some(norm) = acc.finish() {
                        output.set_value_at(band, idx, output_table.native_from_norm(norm) as f64);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
