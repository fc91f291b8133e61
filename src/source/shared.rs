//! Shared handle for a node consumed by several downstream nodes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::PipelineError;
use crate::raster::{DPoint, IRect, PixelBuffer, ScalarType};

use super::ImageSource;

/// Clonable handle that serializes every call into the wrapped node.
///
/// Use this when one source feeds more than one combiner, or when several
/// threads pull from the same subgraph.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Box<dyn ImageSource>>>,
}

impl SharedSource {
    pub fn new(source: impl ImageSource + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn ImageSource>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageSource for SharedSource {
    fn get_tile(&mut self, rect: &IRect, level: u32) -> Option<Arc<PixelBuffer>> {
        self.lock().get_tile(rect, level)
    }

    fn number_of_output_bands(&self) -> u32 {
        self.lock().number_of_output_bands()
    }

    fn output_scalar_type(&self) -> ScalarType {
        self.lock().output_scalar_type()
    }

    fn null_pixel_value(&self, band: u32) -> f64 {
        self.lock().null_pixel_value(band)
    }

    fn min_pixel_value(&self, band: u32) -> f64 {
        self.lock().min_pixel_value(band)
    }

    fn max_pixel_value(&self, band: u32) -> f64 {
        self.lock().max_pixel_value(band)
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        self.lock().initialize()
    }

    fn bounding_rect(&self, level: u32) -> IRect {
        self.lock().bounding_rect(level)
    }

    fn valid_vertices(&self) -> Vec<DPoint> {
        self.lock().valid_vertices()
    }

    fn number_of_inputs(&self) -> usize {
        self.lock().number_of_inputs()
    }
}
