//! Multi-input compositing.
//!
//! A [`Combiner`] is an [`ImageSource`] with N inputs. For every request it
//! pulls the same rect and level from each input in connection order, then
//! hands the tiles to a [`Compositor`] that merges them per pixel and per
//! band.
//!
//! # Compositors
//!
//! | Type | Rule | Alias |
//! |------|------|-------|
//! | [`FirstValid`] | first non-null input wins | [`SimpleMosaic`] |
//! | [`MaxValue`] | largest non-null native value | [`MaxMosaic`] |
//! | [`WeightedBlend`] | fixed-weight mean in normalized space | [`BlendMosaic`] |
//! | [`FeatherBlend`] | distance-to-edge weighted mean | [`FeatherMosaic`] |
//!
//! Every compositor writes null only where all inputs are null.
//!
//! # Failure Semantics
//!
//! - No inputs: the combiner produces no data and `get_tile` returns `None`.
//! - Inputs with different band counts: `initialize` fails with
//!   [`PipelineError::BandCountMismatch`]; no bands are truncated or padded.
//! - A combiner asked for tiles while misconfigured logs a warning once and
//!   returns `None`.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::raster::{IRect, PixelBuffer, ScalarType, TileStatus};
use crate::source::{publish_tile, recycle_tile, ImageSource};

mod blend;
mod feather;
mod mosaic;

pub use blend::WeightedBlend;
pub use feather::{FeatherBlend, FeatherFalloff, FeatherGeometry};
pub use mosaic::{FirstValid, MaxValue};

/// First-non-null mosaic.
pub type SimpleMosaic = Combiner<FirstValid>;

/// Per-pixel maximum mosaic.
pub type MaxMosaic = Combiner<MaxValue>;

/// Fixed-weight blend mosaic.
pub type BlendMosaic = Combiner<WeightedBlend>;

/// Feathered blend mosaic.
pub type FeatherMosaic = Combiner<FeatherBlend>;

// =============================================================================
// Output Layout
// =============================================================================

/// Output metadata fixed at `initialize()`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    pub band_count: u32,
    pub scalar: ScalarType,
    pub null_values: Vec<f64>,
    pub min_values: Vec<f64>,
    pub max_values: Vec<f64>,
}

impl OutputLayout {
    fn apply(&self, tile: &mut PixelBuffer) {
        for band in 0..self.band_count {
            let b = band as usize;
            tile.set_null_value(band, self.null_values[b]);
            tile.set_min_value(band, self.min_values[b]);
            tile.set_max_value(band, self.max_values[b]);
        }
    }
}

// =============================================================================
// Compositor Trait
// =============================================================================

/// Per-pixel merge rule plugged into a [`Combiner`].
pub trait Compositor: Send {
    /// Validate the inputs and precompute per-input state. Called from
    /// [`ImageSource::initialize`].
    fn prepare(
        &mut self,
        inputs: &[Box<dyn ImageSource>],
        layout: &OutputLayout,
    ) -> Result<(), PipelineError>;

    /// Merge input tiles into `output`.
    ///
    /// `tiles[i]` belongs to input `i` and covers exactly `output.rect()`;
    /// `None` means input `i` has no data there. `output` arrives filled
    /// with its null values.
    fn compose(&self, tiles: &[Option<&PixelBuffer>], output: &mut PixelBuffer, level: u32);
}

// =============================================================================
// Combiner
// =============================================================================

/// An image source merging N inputs with a [`Compositor`].
///
/// # Example
///
/// ```
/// use raster_mosaic::combine::{FirstValid, SimpleMosaic};
/// use raster_mosaic::raster::{IRect, ScalarType};
/// use raster_mosaic::source::{ImageSource, MemorySource};
///
/// let mut mosaic = SimpleMosaic::new(FirstValid::new());
/// mosaic.connect(MemorySource::filled(IRect::new(0, 0, 4, 4), 1, ScalarType::U8, 100.0));
/// mosaic.connect(MemorySource::filled(IRect::new(2, 0, 4, 4), 1, ScalarType::U8, 200.0));
/// mosaic.initialize().unwrap();
///
/// let tile = mosaic.get_tile(&IRect::new(0, 0, 6, 4), 0).unwrap();
/// assert_eq!(tile.get_sample(0, 3, 0).unwrap(), 100.0);
/// assert_eq!(tile.get_sample(0, 4, 0).unwrap(), 200.0);
/// ```
pub struct Combiner<C: Compositor> {
    /// Inputs in connection order
    inputs: Vec<Box<dyn ImageSource>>,

    compositor: C,

    /// `None` until a successful initialize with at least one input
    layout: Option<OutputLayout>,

    /// Forces the output scalar type instead of taking input 0's
    scalar_override: Option<ScalarType>,

    /// Topology or compositor changed since the last initialize
    dirty: bool,

    /// Output buffer reused between calls
    tile: Option<Arc<PixelBuffer>>,
}

impl<C: Compositor> Combiner<C> {
    pub fn new(compositor: C) -> Self {
        Self {
            inputs: Vec::new(),
            compositor,
            layout: None,
            scalar_override: None,
            dirty: true,
            tile: None,
        }
    }

    pub fn with_inputs(compositor: C, inputs: Vec<Box<dyn ImageSource>>) -> Self {
        let mut combiner = Self::new(compositor);
        combiner.inputs = inputs;
        combiner
    }

    /// Append an input. Returns its index.
    pub fn connect(&mut self, input: impl ImageSource + 'static) -> usize {
        self.connect_boxed(Box::new(input))
    }

    pub fn connect_boxed(&mut self, input: Box<dyn ImageSource>) -> usize {
        self.inputs.push(input);
        self.dirty = true;
        self.inputs.len() - 1
    }

    /// Remove the input at `index`; later inputs shift down.
    pub fn disconnect(&mut self, index: usize) -> Option<Box<dyn ImageSource>> {
        if index >= self.inputs.len() {
            return None;
        }
        self.dirty = true;
        Some(self.inputs.remove(index))
    }

    pub fn input(&self, index: usize) -> Option<&dyn ImageSource> {
        self.inputs.get(index).map(|input| input.as_ref() as &dyn ImageSource)
    }

    /// Mutable access to an input. Marks the combiner for re-initialization.
    pub fn input_mut(&mut self, index: usize) -> Option<&mut (dyn ImageSource + 'static)> {
        self.dirty = true;
        self.inputs.get_mut(index).map(|input| input.as_mut())
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    /// Mutable access to the compositor. Marks the combiner for
    /// re-initialization.
    pub fn compositor_mut(&mut self) -> &mut C {
        self.dirty = true;
        &mut self.compositor
    }

    /// Force the output scalar type (`None` follows input 0).
    pub fn set_output_scalar_type(&mut self, scalar: Option<ScalarType>) {
        self.scalar_override = scalar;
        self.dirty = true;
    }

    /// Output metadata, `None` while the combiner produces no data.
    pub fn layout(&self) -> Option<&OutputLayout> {
        self.layout.as_ref()
    }

    fn build_layout(&self) -> Result<Option<OutputLayout>, PipelineError> {
        let Some(first) = self.inputs.first() else {
            return Ok(None);
        };
        let band_count = first.number_of_output_bands();
        for (index, input) in self.inputs.iter().enumerate().skip(1) {
            let found = input.number_of_output_bands();
            if found != band_count {
                return Err(PipelineError::BandCountMismatch {
                    input: index,
                    expected: band_count,
                    found,
                });
            }
        }

        let input_scalar = first.output_scalar_type();
        let scalar = self.scalar_override.unwrap_or(input_scalar);
        let bands = 0..band_count;
        let layout = if scalar == input_scalar {
            OutputLayout {
                band_count,
                scalar,
                null_values: bands.clone().map(|b| first.null_pixel_value(b)).collect(),
                min_values: bands.clone().map(|b| first.min_pixel_value(b)).collect(),
                max_values: bands.map(|b| first.max_pixel_value(b)).collect(),
            }
        } else {
            let n = band_count as usize;
            OutputLayout {
                band_count,
                scalar,
                null_values: vec![scalar.default_null(); n],
                min_values: vec![scalar.default_min(); n],
                max_values: vec![scalar.default_max(); n],
            }
        };
        Ok(Some(layout))
    }
}

/// Input tile re-aligned to the request rect; empty tiles count as absent.
fn align<'a>(tile: &'a Option<Arc<PixelBuffer>>, rect: &IRect) -> Option<Cow<'a, PixelBuffer>> {
    let tile = tile.as_ref()?;
    if tile.status() == TileStatus::Empty {
        return None;
    }
    if tile.rect() == *rect {
        return Some(Cow::Borrowed(tile.as_ref()));
    }
    let mut aligned = PixelBuffer::new(*rect, tile.band_count(), tile.scalar_type());
    for band in 0..tile.band_count() {
        aligned.set_null_value(band, tile.null_value(band));
        aligned.set_min_value(band, tile.min_value(band));
        aligned.set_max_value(band, tile.max_value(band));
    }
    aligned.make_blank();
    aligned.load_tile(tile);
    Some(Cow::Owned(aligned))
}

impl<C: Compositor> ImageSource for Combiner<C> {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        if rect.is_empty() {
            return None;
        }
        if self.dirty {
            if let Err(error) = self.initialize() {
                warn!(%error, "combiner misconfigured, producing no data");
                return None;
            }
        }
        let layout = self.layout.as_ref()?;
        if !self.bounding_rect(level).intersects(rect) {
            return None;
        }

        let tiles: Vec<Option<Arc<PixelBuffer>>> = self
            .inputs
            .iter_mut()
            .map(|input| input.get_tile(rect, level))
            .collect();
        let aligned: Vec<Option<Cow<'_, PixelBuffer>>> =
            tiles.iter().map(|tile| align(tile, rect)).collect();
        let refs: Vec<Option<&PixelBuffer>> = aligned.iter().map(|t| t.as_deref()).collect();

        let mut slot = self.tile.take();
        let mut output = recycle_tile(&mut slot, *rect, layout.band_count, layout.scalar);
        layout.apply(&mut output);
        output.make_blank();

        self.compositor.compose(&refs, &mut output, level);
        output.validate();
        Some(publish_tile(&mut self.tile, output))
    }

    fn number_of_output_bands(&self) -> u32 {
        match (&self.layout, self.inputs.first()) {
            (Some(layout), _) => layout.band_count,
            (None, Some(first)) => first.number_of_output_bands(),
            (None, None) => 0,
        }
    }

    fn output_scalar_type(&self) -> ScalarType {
        match (&self.layout, self.inputs.first()) {
            (Some(layout), _) => layout.scalar,
            (None, Some(first)) => self.scalar_override.unwrap_or(first.output_scalar_type()),
            (None, None) => self.scalar_override.unwrap_or(ScalarType::U8),
        }
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        match &self.layout {
            Some(layout) => layout.null_values[band as usize],
            None => self.output_scalar_type().default_null(),
        }
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        match &self.layout {
            Some(layout) => layout.min_values[band as usize],
            None => self.output_scalar_type().default_min(),
        }
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        match &self.layout {
            Some(layout) => layout.max_values[band as usize],
            None => self.output_scalar_type().default_max(),
        }
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        self.dirty = false;
        self.layout = None;
        self.tile = None;

        for input in &mut self.inputs {
            input.initialize()?;
        }
        let Some(layout) = self.build_layout()? else {
            debug!("combiner has no inputs, producing no data");
            return Ok(());
        };
        self.compositor.prepare(&self.inputs, &layout)?;
        debug!(
            inputs = self.inputs.len(),
            bands = layout.band_count,
            scalar = ?layout.scalar,
            "combiner initialized"
        );
        self.layout = Some(layout);
        Ok(())
    }

    /// Union of the inputs' extents.
    fn bounding_rect(&self, level: u32) -> IRect {
        self.inputs
            .iter()
            .map(|input| input.bounding_rect(level))
            .fold(IRect::empty(), |acc, r| acc.union(&r))
    }

    fn number_of_inputs(&self) -> usize {
        self.inputs.len()
    }
}

// =============================================================================
// Combiner Kind
// =============================================================================

/// Closed set of compositing strategies, for building graphs from
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CombinerKind {
    SimpleMosaic,
    MaxMosaic,
    WeightedBlend,
    FeatherBlend,
}

impl CombinerKind {
    /// Build a combiner over `inputs` using the compositor parameters in
    /// `config`. The result still needs `initialize()`.
    pub fn build(
        self,
        config: &PipelineConfig,
        inputs: Vec<Box<dyn ImageSource>>,
    ) -> Box<dyn ImageSource> {
        match self {
            CombinerKind::SimpleMosaic => Box::new(Combiner::with_inputs(FirstValid::new(), inputs)),
            CombinerKind::MaxMosaic => Box::new(Combiner::with_inputs(MaxValue::new(), inputs)),
            CombinerKind::WeightedBlend => Box::new(Combiner::with_inputs(
                WeightedBlend::with_weights(config.weights.clone()),
                inputs,
            )),
            CombinerKind::FeatherBlend => Box::new(Combiner::with_inputs(
                FeatherBlend::new()
                    .with_falloff(config.feather_falloff)
                    .with_min_weight(config.feather_min_weight),
                inputs,
            )),
        }
    }
}

impl FromStr for CombinerKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "simple-mosaic" | "simple" => Ok(CombinerKind::SimpleMosaic),
            "max-mosaic" | "max" => Ok(CombinerKind::MaxMosaic),
            "weighted-blend" | "blend" => Ok(CombinerKind::WeightedBlend),
            "feather-blend" | "feather" => Ok(CombinerKind::FeatherBlend),
            _ => Err(PipelineError::UnknownSourceKind(s.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
