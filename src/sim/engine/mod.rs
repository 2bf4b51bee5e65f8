//! Partial ray results and the engine that merges them into per-pixel spectra.
//!
//! A tracing pass (or a domain-decomposed worker) produces partials in no
//! particular order. The [`PartialCompositor`] sorts them, reduces every
//! same-pixel group with [`Partial::blend`], and applies the background.

pub mod absorption;
pub mod compositor;
pub mod emission;

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::{Result, TraceError};
use crate::sim::precision::Precision;

pub use absorption::AbsorptionPartial;
pub use compositor::{MergeStats, PartialCompositor};
pub use emission::EmissionPartial;

/// One ray segment's contribution to one pixel.
pub trait Partial: Clone + Send + Sync {
    type Value: Precision;

    /// Whether same-pixel partials must be blended front-to-back.
    ///
    /// Pure absorption commutes, so only `pixel_id` is needed to order it.
    const DEPTH_ORDERED: bool;

    fn pixel_id(&self) -> usize;

    /// Distance along the ray, used for front-to-back ordering.
    fn depth(&self) -> f64;

    fn num_bins(&self) -> usize;

    /// Checks that every per-bin vector carried by `self` has `num_bins` values.
    fn check_shape(&self, num_bins: usize) -> Result<()> {
        check_bins(num_bins, self.num_bins())
    }

    /// Blends `other`, which lies behind `self`, into `self`.
    fn blend(&mut self, other: &Self) -> Result<()>;

    /// Blends the shared background record into `self`.
    fn blend_background(&mut self, background: &[Self::Value]) -> Result<()>;

    /// Merge order: pixel id, then depth when the blend is order-dependent.
    fn merge_order(&self, other: &Self) -> Ordering {
        let by_pixel = self.pixel_id().cmp(&other.pixel_id());
        if Self::DEPTH_ORDERED {
            by_pixel.then_with(|| self.depth().total_cmp(&other.depth()))
        } else {
            by_pixel
        }
    }
}

/// Multiplies `other` into `bins` element-wise.
///
/// Fails with [`TraceError::InvariantViolation`] if the lengths differ.
pub(crate) fn multiply_bins<P: Precision>(bins: &mut [P], other: &[P]) -> Result<()> {
    check_bins(bins.len(), other.len())?;
    for (b, o) in bins.iter_mut().zip(other) {
        *b = *b * *o;
    }
    Ok(())
}

pub(crate) fn check_bins(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(TraceError::invariant(format!(
            "bin count mismatch: {expected} != {got}"
        )));
    }
    Ok(())
}

/// Sorts partials into merge order (see [`Partial::merge_order`]).
pub fn sort_partials<T: Partial>(partials: &mut [T]) {
    partials.par_sort_by(|a, b| a.merge_order(b));
}

/// Blends `background` into every partial. Each pixel is independent, so the
/// loop runs in parallel.
pub fn composite_background<T: Partial>(partials: &mut [T], background: &[T::Value]) -> Result<()> {
    partials
        .par_iter_mut()
        .try_for_each(|p| p.blend_background(background))
}
