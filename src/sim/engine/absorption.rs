use crate::error::Result;
use crate::sim::precision::Precision;

use super::{Partial, composite_background, multiply_bins};

/// Absorption-only partial: per-bin transmittance along one ray segment.
///
/// Transmittance factors multiply, so same-pixel partials can be merged in
/// any order.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptionPartial<P: Precision> {
    pub pixel_id: usize,
    pub depth: f64,
    pub bins: Vec<P>,
}

impl<P: Precision> AbsorptionPartial<P> {
    pub fn new(pixel_id: usize, depth: f64, bins: Vec<P>) -> Self {
        Self {
            pixel_id,
            depth,
            bins,
        }
    }

    /// Applies the background to every partial in place.
    pub fn composite_background(partials: &mut [Self], background: &[P]) -> Result<()> {
        composite_background(partials, background)
    }
}

impl<P: Precision> Default for AbsorptionPartial<P> {
    fn default() -> Self {
        Self::new(0, 0.0, Vec::new())
    }
}

impl<P: Precision> Partial for AbsorptionPartial<P> {
    type Value = P;

    const DEPTH_ORDERED: bool = false;

    fn pixel_id(&self) -> usize {
        self.pixel_id
    }

    fn depth(&self) -> f64 {
        self.depth
    }

    fn num_bins(&self) -> usize {
        self.bins.len()
    }

    fn blend(&mut self, other: &Self) -> Result<()> {
        multiply_bins(&mut self.bins, &other.bins)
    }

    fn blend_background(&mut self, background: &[P]) -> Result<()> {
        multiply_bins(&mut self.bins, background)
    }
}

pub type AbsorptionPartial32 = AbsorptionPartial<f32>;
pub type AbsorptionPartial64 = AbsorptionPartial<f64>;
