//! Seam to the ray traversal backend.
//!
//! The backend marches rays through a bound dataset and returns partial
//! results. It is consumed through [`TracerBackend`] (creates one binding per
//! dataset) and [`TracerBinding`] (receives configuration, traces rays).

pub mod replay;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::sim::dataset::FieldStore;
use crate::sim::engine::{AbsorptionPartial, EmissionPartial, Partial};
use crate::sim::precision::Precision;
use crate::sim::rays::RayBatch;

pub use replay::{ReplayBackend, ReplayTracer};

/// What the backend accumulates along each ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Per-bin absorption (and optional emission) over spectral bins.
    #[default]
    Energy,
    /// Color-mapped volume rendering.
    Volume,
}

/// Inclusive scalar range. An empty range has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

impl ScalarRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn is_non_empty(&self) -> bool {
        self.min <= self.max
    }

    /// Grows the range to contain `value`.
    pub fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn length(&self) -> f64 {
        if self.is_non_empty() {
            self.max - self.min
        } else {
            0.0
        }
    }

    pub fn center(&self) -> f64 {
        0.5 * (self.min + self.max)
    }
}

impl Default for ScalarRange {
    fn default() -> Self {
        Self::empty()
    }
}

/// One control point of a color map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorPoint {
    /// Normalized scalar position in [0, 1].
    pub position: f64,
    pub rgba: [f32; 4],
}

/// Color map handed to the backend as-is. Only display-oriented modes use it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorMap {
    pub points: Vec<ColorPoint>,
}

impl ColorMap {
    pub fn new(points: Vec<ColorPoint>) -> Self {
        Self { points }
    }

    /// Black-to-white ramp.
    pub fn grayscale() -> Self {
        Self::new(vec![
            ColorPoint {
                position: 0.0,
                rgba: [0.0, 0.0, 0.0, 1.0],
            },
            ColorPoint {
                position: 1.0,
                rgba: [1.0, 1.0, 1.0, 1.0],
            },
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Configuration pushed to a tracer binding before tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerSettings {
    pub scalar_field: String,
    pub emission_field: String,
    pub unit_scalar: f32,
    pub render_mode: RenderMode,
    pub color_map: ColorMap,
    pub composite_background: bool,
    /// Overrides the range computed from the scalar field when set.
    pub scalar_range: Option<ScalarRange>,
}

impl TracerSettings {
    pub fn new() -> Self {
        Self {
            scalar_field: String::new(),
            emission_field: String::new(),
            unit_scalar: 1.0,
            render_mode: RenderMode::Energy,
            color_map: ColorMap::default(),
            composite_background: true,
            scalar_range: None,
        }
    }
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Partials returned by one trace.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialSet<P: Precision> {
    Absorption(Vec<AbsorptionPartial<P>>),
    Emission(Vec<EmissionPartial<P>>),
}

impl<P: Precision> PartialSet<P> {
    pub fn len(&self) -> usize {
        match self {
            PartialSet::Absorption(v) => v.len(),
            PartialSet::Emission(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_emission(&self) -> bool {
        matches!(self, PartialSet::Emission(_))
    }

    /// Bin count of the first partial, if any.
    pub fn num_bins(&self) -> Option<usize> {
        match self {
            PartialSet::Absorption(v) => v.first().map(|p| p.num_bins()),
            PartialSet::Emission(v) => v.first().map(|p| p.num_bins()),
        }
    }

    /// Checks that every partial in the set carries `num_bins` values in each
    /// of its per-bin vectors.
    pub fn check_shape(&self, num_bins: usize) -> Result<()> {
        let checked = match self {
            PartialSet::Absorption(v) => v.iter().try_for_each(|p| p.check_shape(num_bins)),
            PartialSet::Emission(v) => v.iter().try_for_each(|p| p.check_shape(num_bins)),
        };
        checked.map_err(|e| {
            TraceError::invariant(format!("partial set does not match {num_bins} bins: {e}"))
        })
    }
}

pub type PartialVector32 = PartialSet<f32>;
pub type PartialVector64 = PartialSet<f64>;

/// Factory for tracer bindings. One binding is created per bound dataset.
pub trait TracerBackend<P: Precision>: Send {
    fn bind(&self, dataset: Arc<dyn FieldStore>) -> Box<dyn TracerBinding<P>>;
}

/// A tracer attached to one dataset.
///
/// Setters have default implementations that record into [`TracerSettings`];
/// backends override them when they need to validate or react.
pub trait TracerBinding<P: Precision>: Send {
    fn settings(&self) -> &TracerSettings;

    fn settings_mut(&mut self) -> &mut TracerSettings;

    fn set_scalar_field(&mut self, name: &str) -> Result<()> {
        self.settings_mut().scalar_field = name.to_string();
        Ok(())
    }

    fn set_emission_field(&mut self, name: &str) -> Result<()> {
        self.settings_mut().emission_field = name.to_string();
        Ok(())
    }

    /// Turns emission off. Never fails, there is no field to validate.
    fn clear_emission_field(&mut self) {
        self.settings_mut().emission_field.clear();
    }

    fn set_unit_scalar(&mut self, value: f32) {
        self.settings_mut().unit_scalar = value;
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.settings_mut().render_mode = mode;
    }

    fn set_color_map(&mut self, color_map: &ColorMap) {
        self.settings_mut().color_map = color_map.clone();
    }

    fn set_composite_background(&mut self, on: bool) {
        self.settings_mut().composite_background = on;
    }

    fn set_scalar_range(&mut self, range: ScalarRange) {
        self.settings_mut().scalar_range = Some(range);
    }

    /// Range of the scalar field, or the override when one was set.
    fn scalar_field_range(&self) -> ScalarRange;

    /// Traces `rays` and returns the partial results.
    fn partial_trace(&mut self, rays: &mut RayBatch<P>) -> Result<PartialSet<P>>;
}
