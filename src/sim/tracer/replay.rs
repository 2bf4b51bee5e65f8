use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{Result, TraceError};
use crate::sim::dataset::FieldStore;
use crate::sim::precision::Precision;
use crate::sim::rays::{EMISSION_BUFFER, RayBatch};

use super::{PartialSet, ScalarRange, TracerBackend, TracerBinding, TracerSettings};

/// Backend that replays recorded partial sets instead of marching rays.
///
/// Each binding it creates returns the recorded frames in order, one per
/// trace, and an empty set once they run out. With a seed, every frame is
/// shuffled so downstream code sees partials out of order.
#[derive(Debug, Clone)]
pub struct ReplayBackend<P: Precision> {
    frames: Vec<PartialSet<P>>,
    field_range: ScalarRange,
    shuffle_seed: Option<u64>,
}

impl<P: Precision> ReplayBackend<P> {
    pub fn new(frames: Vec<PartialSet<P>>) -> Self {
        Self {
            frames,
            field_range: ScalarRange::new(0.0, 1.0),
            shuffle_seed: None,
        }
    }

    pub fn with_field_range(mut self, range: ScalarRange) -> Self {
        self.field_range = range;
        self
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

impl<P: Precision> TracerBackend<P> for ReplayBackend<P> {
    fn bind(&self, dataset: Arc<dyn FieldStore>) -> Box<dyn TracerBinding<P>> {
        Box::new(ReplayTracer {
            dataset,
            settings: TracerSettings::new(),
            frames: self.frames.iter().cloned().collect(),
            field_range: self.field_range,
            rng: self.shuffle_seed.map(StdRng::seed_from_u64),
            traces: 0,
        })
    }
}

/// Binding created by [`ReplayBackend`].
pub struct ReplayTracer<P: Precision> {
    dataset: Arc<dyn FieldStore>,
    settings: TracerSettings,
    frames: VecDeque<PartialSet<P>>,
    field_range: ScalarRange,
    rng: Option<StdRng>,
    traces: usize,
}

impl<P: Precision> ReplayTracer<P> {
    fn require_field(&self, name: &str) -> Result<()> {
        if self.dataset.field_size(name).is_none() {
            return Err(TraceError::configuration(format!(
                "field '{name}' does not exist ({})",
                self.dataset.summary()
            )));
        }
        Ok(())
    }
}

impl<P: Precision> TracerBinding<P> for ReplayTracer<P> {
    fn settings(&self) -> &TracerSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut TracerSettings {
        &mut self.settings
    }

    fn set_scalar_field(&mut self, name: &str) -> Result<()> {
        self.require_field(name)?;
        self.settings.scalar_field = name.to_string();
        Ok(())
    }

    fn set_emission_field(&mut self, name: &str) -> Result<()> {
        self.require_field(name)?;
        self.settings.emission_field = name.to_string();
        Ok(())
    }

    fn scalar_field_range(&self) -> ScalarRange {
        self.settings.scalar_range.unwrap_or(self.field_range)
    }

    fn partial_trace(&mut self, rays: &mut RayBatch<P>) -> Result<PartialSet<P>> {
        if self.settings.scalar_field.is_empty() {
            return Err(TraceError::configuration("scalar field is not set"));
        }
        let num_channels = rays.primary().num_channels();
        let emission = !self.settings.emission_field.is_empty();
        if emission && !rays.has_buffer(EMISSION_BUFFER) {
            return Err(TraceError::configuration(
                "emission field set but rays carry no emission buffer",
            ));
        }

        self.traces += 1;
        let mut frame = match self.frames.pop_front() {
            Some(frame) => frame,
            None => {
                warn!("replay tracer exhausted after {} traces", self.traces - 1);
                if emission {
                    PartialSet::Emission(Vec::new())
                } else {
                    PartialSet::Absorption(Vec::new())
                }
            }
        };

        if let Some(bins) = frame.num_bins()
            && bins != num_channels
        {
            return Err(TraceError::invariant(format!(
                "recorded partials carry {bins} bins, rays carry {num_channels} channels"
            )));
        }

        if let Some(rng) = self.rng.as_mut() {
            match &mut frame {
                PartialSet::Absorption(v) => v.shuffle(rng),
                PartialSet::Emission(v) => v.shuffle(rng),
            }
        }
        debug!(
            "replayed {} partials for {} rays",
            frame.len(),
            rays.len()
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::dataset::InMemoryDataSet;
    use crate::sim::engine::AbsorptionPartial;

    fn dataset() -> Arc<dyn FieldStore> {
        Arc::new(InMemoryDataSet::new(2).with_field("absorption", vec![1.0; 2]))
    }

    fn frame(n: usize) -> PartialSet<f64> {
        PartialSet::Absorption(
            (0..n)
                .map(|i| AbsorptionPartial::new(i, i as f64, vec![0.5]))
                .collect(),
        )
    }

    #[test]
    fn test_unknown_field_rejected() {
        let backend = ReplayBackend::new(vec![frame(1)]);
        let mut tracer = backend.bind(dataset());
        let err = tracer.set_scalar_field("missing").unwrap_err();
        assert!(err.is_configuration());
        assert!(tracer.settings().scalar_field.is_empty());
    }

    #[test]
    fn test_replays_frames_in_order() {
        let backend = ReplayBackend::new(vec![frame(1), frame(3)]);
        let mut tracer = backend.bind(dataset());
        tracer.set_scalar_field("absorption").unwrap();
        let mut rays = RayBatch::<f64>::for_pixels(3);

        assert_eq!(tracer.partial_trace(&mut rays).unwrap().len(), 1);
        assert_eq!(tracer.partial_trace(&mut rays).unwrap().len(), 3);
        assert!(tracer.partial_trace(&mut rays).unwrap().is_empty());
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let backend = ReplayBackend::new(vec![frame(32)]).shuffled(7);
        let mut rays = RayBatch::<f64>::for_pixels(32);

        let mut a = backend.bind(dataset());
        a.set_scalar_field("absorption").unwrap();
        let mut b = backend.bind(dataset());
        b.set_scalar_field("absorption").unwrap();

        let first = a.partial_trace(&mut rays).unwrap();
        let second = b.partial_trace(&mut rays).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, frame(32));
    }

    #[test]
    fn test_bin_mismatch_with_rays() {
        let backend = ReplayBackend::new(vec![frame(1)]);
        let mut tracer = backend.bind(dataset());
        tracer.set_scalar_field("absorption").unwrap();
        let mut rays = RayBatch::<f64>::for_pixels(1);
        rays.primary_mut().set_num_channels(2);
        let err = tracer.partial_trace(&mut rays).unwrap_err();
        assert!(matches!(err, TraceError::InvariantViolation(_)));
    }

    #[test]
    fn test_range_override() {
        let backend = ReplayBackend::<f32>::new(Vec::new())
            .with_field_range(ScalarRange::new(-1.0, 4.0));
        let mut tracer = backend.bind(dataset());
        assert_eq!(tracer.scalar_field_range(), ScalarRange::new(-1.0, 4.0));
        tracer.set_scalar_range(ScalarRange::new(0.0, 2.0));
        assert_eq!(tracer.scalar_field_range(), ScalarRange::new(0.0, 2.0));
    }
}
