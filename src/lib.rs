pub mod error;
pub mod sim;

// Prelude
pub use error::{Result, TraceError};
pub use sim::dataset::{FieldStore, InMemoryDataSet};
pub use sim::energy::{EnergyConfig, EnergyEngine, EnergyRender, PixelSpectrum};
pub use sim::engine::{AbsorptionPartial, EmissionPartial, MergeStats, Partial, PartialCompositor};
pub use sim::precision::Precision;
pub use sim::rays::{Ray32, Ray64, RayBatch};
pub use sim::tracer::{
    ColorMap, PartialSet, PartialVector32, PartialVector64, RenderMode, ReplayBackend,
    ScalarRange, TracerBackend, TracerBinding, TracerSettings,
};
