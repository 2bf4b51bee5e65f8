use crate::error::Result;
use crate::sim::precision::Precision;

use super::{Partial, check_bins, composite_background, multiply_bins};

/// Partial carrying both transmittance (`bins`) and accumulated emission.
///
/// Emission gathered behind a segment is attenuated by that segment's
/// transmittance, so blending is order-dependent and must run front-to-back.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionPartial<P: Precision> {
    pub pixel_id: usize,
    pub depth: f64,
    pub bins: Vec<P>,
    pub emission_bins: Vec<P>,
}

impl<P: Precision> EmissionPartial<P> {
    pub fn new(pixel_id: usize, depth: f64, bins: Vec<P>, emission_bins: Vec<P>) -> Self {
        Self {
            pixel_id,
            depth,
            bins,
            emission_bins,
        }
    }

    /// Applies the background to every partial in place.
    pub fn composite_background(partials: &mut [Self], background: &[P]) -> Result<()> {
        composite_background(partials, background)
    }
}

impl<P: Precision> Partial for EmissionPartial<P> {
    type Value = P;

    const DEPTH_ORDERED: bool = true;

    fn pixel_id(&self) -> usize {
        self.pixel_id
    }

    fn depth(&self) -> f64 {
        self.depth
    }

    fn num_bins(&self) -> usize {
        self.bins.len()
    }

    fn check_shape(&self, num_bins: usize) -> Result<()> {
        check_bins(num_bins, self.bins.len())?;
        check_bins(num_bins, self.emission_bins.len())
    }

    fn blend(&mut self, other: &Self) -> Result<()> {
        let num_bins = self.bins.len();
        check_bins(num_bins, other.bins.len())?;
        check_bins(num_bins, self.emission_bins.len())?;
        check_bins(num_bins, other.emission_bins.len())?;

        // Emission uses the front transmittance before it absorbs `other`.
        for i in 0..num_bins {
            self.emission_bins[i] = self.emission_bins[i] + self.bins[i] * other.emission_bins[i];
            self.bins[i] = self.bins[i] * other.bins[i];
        }
        Ok(())
    }

    /// The background only attenuates; it carries no emission of its own.
    fn blend_background(&mut self, background: &[P]) -> Result<()> {
        multiply_bins(&mut self.bins, background)
    }
}

pub type EmissionPartial32 = EmissionPartial<f32>;
pub type EmissionPartial64 = EmissionPartial<f64>;
