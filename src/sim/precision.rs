use std::fmt::Debug;

use num::{Float, NumCast};

/// Floating-point width used for ray channels and partial bins.
///
/// Implemented for `f32` and `f64`. Depth values are always `f64` regardless
/// of the precision chosen here.
pub trait Precision: Float + NumCast + Debug + Default + Send + Sync + 'static {
    /// Converts an `f64` literal into this precision.
    fn from_f64(value: f64) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::nan)
    }

    fn as_f64(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }
}

impl Precision for f32 {}
impl Precision for f64 {}
