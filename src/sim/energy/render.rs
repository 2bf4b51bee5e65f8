use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crate::sim::dataset::FieldStore;
use crate::sim::engine::{AbsorptionPartial, EmissionPartial, PartialCompositor};
use crate::sim::precision::Precision;
use crate::sim::rays::RayBatch;
use crate::sim::tracer::{PartialSet, TracerBackend};

use super::config::EnergyConfig;
use super::engine::EnergyEngine;

/// Final per-bin values of one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSpectrum<P: Precision> {
    pub pixel_id: usize,
    /// Transmittance per bin (after the background).
    pub bins: Vec<P>,
    /// Accumulated emission per bin, when an emission field was traced.
    pub emission: Option<Vec<P>>,
}

/// One render session: binning controller plus compositor.
///
/// Traces a batch of rays, merges the partials per pixel and applies the
/// configured background. Partials received from other workers can be
/// merged in through [`EnergyRender::render_with_remote`].
pub struct EnergyRender<P: Precision> {
    engine: EnergyEngine<P>,
    config: EnergyConfig,
}

impl<P: Precision> EnergyRender<P> {
    pub fn new<B: TracerBackend<P> + 'static>(
        backend: B,
        dataset: Arc<dyn FieldStore>,
        config: EnergyConfig,
    ) -> Result<Self> {
        let mut engine = EnergyEngine::new(backend);
        engine.bind_dataset(dataset);
        engine
            .apply_config(&config)
            .context("failed to configure energy engine")?;
        Ok(Self { engine, config })
    }

    pub fn engine(&self) -> &EnergyEngine<P> {
        &self.engine
    }

    pub fn config(&self) -> &EnergyConfig {
        &self.config
    }

    /// Traces `rays` and returns one spectrum per covered pixel, sorted by pixel id.
    pub fn render(&mut self, rays: &mut RayBatch<P>) -> Result<Vec<PixelSpectrum<P>>> {
        self.render_with_remote(rays, Vec::new())
    }

    /// Like [`Self::render`], also merging partial sets received from other workers.
    pub fn render_with_remote(
        &mut self,
        rays: &mut RayBatch<P>,
        remote: Vec<PartialSet<P>>,
    ) -> Result<Vec<PixelSpectrum<P>>> {
        let local = self.engine.trace(rays).context("energy trace failed")?;
        let num_bins = self.engine.detect_num_bins()?;
        let compositor = self.compositor(num_bins)?;

        let mut sets = Vec::with_capacity(remote.len() + 1);
        sets.push(local);
        sets.extend(remote);
        for set in &sets {
            set.check_shape(num_bins)
                .context("partial set does not match bin count")?;
        }

        let pixels = if self.engine.has_emission() {
            let sets = sets
                .into_iter()
                .map(|set| -> Result<Vec<EmissionPartial<P>>> {
                    match set {
                        PartialSet::Emission(v) => Ok(v),
                        PartialSet::Absorption(_) => {
                            anyhow::bail!("emission render received absorption-only partials")
                        }
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            compositor
                .merge_workers(sets)?
                .into_iter()
                .map(|p| PixelSpectrum {
                    pixel_id: p.pixel_id,
                    bins: p.bins,
                    emission: Some(p.emission_bins),
                })
                .collect::<Vec<_>>()
        } else {
            let sets = sets
                .into_iter()
                .map(|set| -> Result<Vec<AbsorptionPartial<P>>> {
                    match set {
                        PartialSet::Absorption(v) => Ok(v),
                        PartialSet::Emission(_) => {
                            anyhow::bail!("absorption render received emission partials")
                        }
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            compositor
                .merge_workers(sets)?
                .into_iter()
                .map(|p| PixelSpectrum {
                    pixel_id: p.pixel_id,
                    bins: p.bins,
                    emission: None,
                })
                .collect::<Vec<_>>()
        };

        info!("rendered {} pixels with {} bins", pixels.len(), num_bins);
        Ok(pixels)
    }

    fn compositor(&self, num_bins: usize) -> Result<PartialCompositor<P>> {
        let mut compositor = PartialCompositor::new();
        if self.config.composite_background
            && let Some(background) = &self.config.background
        {
            anyhow::ensure!(
                background.len() == num_bins,
                "background has {} bins, render has {}",
                background.len(),
                num_bins
            );
            compositor.set_background(Some(background.iter().map(|&v| P::from_f64(v)).collect()));
        }
        Ok(compositor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::dataset::InMemoryDataSet;
    use crate::sim::tracer::ReplayBackend;

    fn dataset() -> Arc<dyn FieldStore> {
        Arc::new(
            InMemoryDataSet::new(4)
                .with_field("absorption", vec![0.5; 8])
                .with_field("emission", vec![0.1; 8]),
        )
    }

    #[test]
    fn test_render_absorption_with_background() {
        let frame = PartialSet::Absorption(vec![
            AbsorptionPartial::new(1, 0.0, vec![0.5_f64, 0.5]),
            AbsorptionPartial::new(0, 0.0, vec![0.25, 0.5]),
            AbsorptionPartial::new(1, 0.0, vec![0.5, 0.5]),
        ]);
        let mut config = EnergyConfig::with_fields("absorption", "");
        config.background = Some(vec![1.0, 0.5]);
        let mut render = EnergyRender::new(ReplayBackend::new(vec![frame]), dataset(), config).unwrap();

        let mut rays = RayBatch::for_pixels(2);
        let pixels = render.render(&mut rays).unwrap();
        assert_eq!(pixels.len(), 2);
        assert_eq!(pixels[0].pixel_id, 0);
        assert!((pixels[0].bins[0] - 0.25).abs() < 1e-10);
        assert!((pixels[0].bins[1] - 0.25).abs() < 1e-10);
        assert!((pixels[1].bins[0] - 0.25).abs() < 1e-10);
        assert!((pixels[1].bins[1] - 0.125).abs() < 1e-10);
        assert!(pixels[0].emission.is_none());
    }

    #[test]
    fn test_background_ignored_when_disabled() {
        let frame = PartialSet::Absorption(vec![AbsorptionPartial::new(0, 0.0, vec![0.5_f64, 0.5])]);
        let mut config = EnergyConfig::with_fields("absorption", "");
        config.composite_background = false;
        config.background = Some(vec![0.0, 0.0]);
        let mut render = EnergyRender::new(ReplayBackend::new(vec![frame]), dataset(), config).unwrap();
        let pixels = render.render(&mut RayBatch::for_pixels(1)).unwrap();
        assert!((pixels[0].bins[0] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_background_bin_mismatch() {
        let frame = PartialSet::Absorption(vec![AbsorptionPartial::new(0, 0.0, vec![0.5_f64, 0.5])]);
        let mut config = EnergyConfig::with_fields("absorption", "");
        config.background = Some(vec![1.0]);
        let mut render = EnergyRender::new(ReplayBackend::new(vec![frame]), dataset(), config).unwrap();
        assert!(render.render(&mut RayBatch::for_pixels(1)).is_err());
    }

    #[test]
    fn test_render_with_remote_emission() {
        let local = PartialSet::Emission(vec![EmissionPartial::new(0, 2.0, vec![1.0_f64, 1.0], vec![2.0, 2.0])]);
        let remote = PartialSet::Emission(vec![EmissionPartial::new(0, 1.0, vec![0.5, 0.25], vec![0.0, 0.0])]);
        let config = EnergyConfig::with_fields("absorption", "emission");
        let mut render = EnergyRender::new(ReplayBackend::new(vec![local]), dataset(), config).unwrap();

        let pixels = render
            .render_with_remote(&mut RayBatch::for_pixels(1), vec![remote])
            .unwrap();
        assert_eq!(pixels.len(), 1);
        let emission = pixels[0].emission.as_ref().unwrap();
        assert!((emission[0] - 1.0).abs() < 1e-10);
        assert!((emission[1] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_render_rejects_short_remote_emission() {
        let local = PartialSet::Emission(vec![EmissionPartial::new(0, 2.0, vec![1.0_f64, 1.0], vec![2.0, 2.0])]);
        let remote = PartialSet::Emission(vec![EmissionPartial::new(1, 1.0, vec![0.5, 0.25], vec![0.0])]);
        let config = EnergyConfig::with_fields("absorption", "emission");
        let mut render = EnergyRender::new(ReplayBackend::new(vec![local]), dataset(), config).unwrap();

        let err = render
            .render_with_remote(&mut RayBatch::for_pixels(2), vec![remote])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::TraceError>(),
            Some(crate::error::TraceError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_render_rejects_wrong_partial_kind() {
        let frame = PartialSet::Absorption(vec![AbsorptionPartial::new(0, 0.0, vec![0.5_f64, 0.5])]);
        let config = EnergyConfig::with_fields("absorption", "emission");
        let mut render = EnergyRender::new(ReplayBackend::new(vec![frame]), dataset(), config).unwrap();
        assert!(render.render(&mut RayBatch::for_pixels(1)).is_err());
    }

    #[test]
    fn test_new_fails_on_unknown_field() {
        let config = EnergyConfig::with_fields("density", "");
        let render = EnergyRender::<f64>::new(ReplayBackend::new(Vec::new()), dataset(), config);
        assert!(render.is_err());
    }
}
