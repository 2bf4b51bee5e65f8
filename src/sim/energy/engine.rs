use std::sync::Arc;

use log::{debug, error, info};

use crate::error::{Result, TraceError};
use crate::sim::dataset::FieldStore;
use crate::sim::precision::Precision;
use crate::sim::rays::{EMISSION_BUFFER, RayBatch};
use crate::sim::tracer::{
    ColorMap, PartialSet, RenderMode, ScalarRange, TracerBackend, TracerBinding, TracerSettings,
};

use super::config::EnergyConfig;

/// Spectral binning controller.
///
/// Owns the dataset binding and the tracer binding for one render session.
/// Derives the number of spectral bins from the primary field, sizes ray
/// buffers accordingly and forwards configuration to the tracer.
pub struct EnergyEngine<P: Precision> {
    backend: Box<dyn TracerBackend<P>>,
    dataset: Option<Arc<dyn FieldStore>>,
    tracer: Option<Box<dyn TracerBinding<P>>>,
    primary_field: String,
    secondary_field: String,
    unit_scalar: f32,
    color_map: ColorMap,
}

impl<P: Precision> EnergyEngine<P> {
    pub fn new<B: TracerBackend<P> + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
            dataset: None,
            tracer: None,
            primary_field: String::new(),
            secondary_field: String::new(),
            unit_scalar: 1.0,
            color_map: ColorMap::default(),
        }
    }

    /// Binds a dataset, replacing any previous dataset and tracer binding.
    ///
    /// Field selections belong to the old binding and are cleared.
    pub fn bind_dataset(&mut self, dataset: Arc<dyn FieldStore>) {
        info!("energy engine setting data set ({})", dataset.summary());
        let mut tracer = self.backend.bind(Arc::clone(&dataset));
        tracer.set_render_mode(RenderMode::Energy);
        self.tracer = Some(tracer);
        self.dataset = Some(dataset);
        self.primary_field.clear();
        self.secondary_field.clear();
    }

    pub fn is_bound(&self) -> bool {
        self.tracer.is_some()
    }

    pub fn primary_field(&self) -> &str {
        &self.primary_field
    }

    pub fn secondary_field(&self) -> &str {
        &self.secondary_field
    }

    /// True when a secondary (emission) field is selected.
    pub fn has_emission(&self) -> bool {
        !self.secondary_field.is_empty()
    }

    pub fn unit_scalar(&self) -> f32 {
        self.unit_scalar
    }

    /// Settings currently held by the tracer binding, if one exists.
    pub fn tracer_settings(&self) -> Option<&TracerSettings> {
        self.tracer.as_ref().map(|t| t.settings())
    }

    fn tracer_mut(&mut self) -> Result<&mut Box<dyn TracerBinding<P>>> {
        match self.tracer.as_mut() {
            Some(tracer) => Ok(tracer),
            None => {
                error!("energy engine: tracer is not bound, data set was never set");
                Err(TraceError::configuration(
                    "data set was never set, no tracer is bound",
                ))
            }
        }
    }

    fn tracer(&self) -> Result<&dyn TracerBinding<P>> {
        match self.tracer.as_deref() {
            Some(tracer) => Ok(tracer),
            None => {
                error!("energy engine: tracer is not bound, data set was never set");
                Err(TraceError::configuration(
                    "data set was never set, no tracer is bound",
                ))
            }
        }
    }

    /// Selects the absorption field and pushes it to the tracer.
    pub fn set_primary_field(&mut self, name: &str) -> Result<()> {
        info!("energy engine setting primary field {name}");
        self.tracer_mut()?.set_scalar_field(name)?;
        self.primary_field = name.to_string();
        Ok(())
    }

    /// Selects the emission field. An empty name disables emission.
    pub fn set_secondary_field(&mut self, name: &str) -> Result<()> {
        info!("energy engine setting secondary field {name}");
        let tracer = self.tracer_mut()?;
        if name.is_empty() {
            tracer.clear_emission_field();
        } else {
            tracer.set_emission_field(name)?;
        }
        self.secondary_field = name.to_string();
        Ok(())
    }

    /// Number of spectral bins: primary field size divided by the cell count.
    ///
    /// Scalar fields give one bin; stacked per-cell spectra give more.
    pub fn detect_num_bins(&self) -> Result<usize> {
        let dataset = match &self.dataset {
            Some(dataset) => dataset,
            None => {
                return Err(TraceError::configuration(
                    "failed to detect bins: data set was never set",
                ));
            }
        };
        if self.primary_field.is_empty() {
            return Err(TraceError::configuration(
                "failed to detect bins: primary field is not set",
            ));
        }
        let field_size = dataset.field_size(&self.primary_field).ok_or_else(|| {
            TraceError::configuration(format!(
                "failed to detect bins: field '{}' does not exist",
                self.primary_field
            ))
        })?;
        let num_cells = dataset.num_cells();

        if num_cells == 0 {
            error!(
                "detect bins failed, num cells is 0 (field size {field_size}): {}",
                dataset.summary()
            );
            return Err(TraceError::configuration(
                "failed to detect bins: num cells cannot be 0",
            ));
        }
        let modulo = field_size % num_cells;
        if modulo != 0 {
            error!(
                "absorption does not evenly divide the number of cells: mod {modulo}, num cells {num_cells}, field size {field_size}"
            );
            return Err(TraceError::configuration(format!(
                "non-divisible field size: {field_size} values over {num_cells} cells"
            )));
        }
        let num_bins = field_size / num_cells;
        if num_bins == 0 {
            return Err(TraceError::configuration(format!(
                "failed to detect bins: field '{}' is empty",
                self.primary_field
            )));
        }
        debug!("detected {num_bins} bins");
        Ok(num_bins)
    }

    /// Number of output channels per pixel. Same as [`Self::detect_num_bins`].
    pub fn num_channels(&self) -> Result<usize> {
        self.detect_num_bins()
    }

    /// The emission field must hold one value per cell and bin, like the
    /// primary field.
    fn check_secondary_field(&self, num_bins: usize) -> Result<()> {
        let dataset = self.dataset.as_ref().ok_or_else(|| {
            TraceError::configuration("failed to check secondary field: data set was never set")
        })?;
        let num_cells = dataset.num_cells();
        let expected = num_cells * num_bins;
        match dataset.field_size(&self.secondary_field) {
            Some(size) if size == expected => Ok(()),
            Some(size) => {
                error!(
                    "emission field '{}' has {size} values, expected {expected} ({num_cells} cells, {num_bins} bins)",
                    self.secondary_field
                );
                Err(TraceError::configuration(format!(
                    "secondary field size does not match: {size} values, expected {expected}"
                )))
            }
            None => Err(TraceError::configuration(format!(
                "secondary field '{}' does not exist",
                self.secondary_field
            ))),
        }
    }

    /// Sizes the primary buffer to `num_bins` channels of 1.0 and, with an
    /// emission field set, adds an emission buffer of 0.0. A leftover
    /// emission buffer is dropped when emission is off.
    ///
    /// Returns the bin count.
    pub fn initialize_ray_buffers(&self, rays: &mut RayBatch<P>) -> Result<usize> {
        let num_bins = self.detect_num_bins()?;
        if self.has_emission() {
            self.check_secondary_field(num_bins)?;
        }

        let primary = rays.primary_mut();
        primary.set_num_channels(num_bins);
        primary.init_const(P::one());

        if self.has_emission() {
            rays.add_buffer(num_bins, EMISSION_BUFFER)
                .init_const(P::zero());
        } else if rays.remove_buffer(EMISSION_BUFFER).is_some() {
            debug!("dropped stale emission buffer");
        }
        Ok(num_bins)
    }

    /// Initializes `rays`, pushes the render configuration and traces.
    ///
    /// The backend's partials are returned unchanged.
    pub fn trace(&mut self, rays: &mut RayBatch<P>) -> Result<PartialSet<P>> {
        self.tracer()?;
        if self.primary_field.is_empty() {
            return Err(TraceError::configuration(
                "primary field is not set, unable to render",
            ));
        }

        info!("energy engine tracing {} rays", rays.len());
        self.initialize_ray_buffers(rays)?;

        let unit_scalar = self.unit_scalar;
        let color_map = self.color_map.clone();
        let tracer = self.tracer_mut()?;
        tracer.set_unit_scalar(unit_scalar);
        tracer.set_render_mode(RenderMode::Energy);
        tracer.set_color_map(&color_map);
        tracer.partial_trace(rays)
    }

    pub fn set_unit_scalar(&mut self, unit_scalar: f32) -> Result<()> {
        info!("energy engine setting unit scalar {unit_scalar}");
        self.tracer_mut()?.set_unit_scalar(unit_scalar);
        self.unit_scalar = unit_scalar;
        Ok(())
    }

    /// Color map pushed to the tracer on every trace.
    pub fn set_color_map(&mut self, color_map: ColorMap) {
        self.color_map = color_map;
    }

    pub fn set_composite_background(&mut self, on: bool) -> Result<()> {
        self.tracer_mut()?.set_composite_background(on);
        Ok(())
    }

    pub fn set_primary_range(&mut self, range: ScalarRange) -> Result<()> {
        self.tracer_mut()?.set_scalar_range(range);
        Ok(())
    }

    pub fn get_primary_range(&self) -> Result<ScalarRange> {
        Ok(self.tracer()?.scalar_field_range())
    }

    /// Pushes a whole configuration onto the bound tracer.
    pub fn apply_config(&mut self, config: &EnergyConfig) -> Result<()> {
        self.set_primary_field(&config.primary_field)?;
        self.set_secondary_field(&config.secondary_field)?;
        self.set_unit_scalar(config.unit_scalar)?;
        self.set_composite_background(config.composite_background)?;
        if let Some(range) = config.primary_range {
            self.set_primary_range(range)?;
        }
        self.set_color_map(config.color_map.clone());
        Ok(())
    }
}

pub type EnergyEngine32 = EnergyEngine<f32>;
pub type EnergyEngine64 = EnergyEngine<f64>;
