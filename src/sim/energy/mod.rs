//! Energy (spectral absorption/emission) rendering.

pub mod config;
pub mod engine;
pub mod render;

pub use config::EnergyConfig;
pub use engine::{EnergyEngine, EnergyEngine32, EnergyEngine64};
pub use render::{EnergyRender, PixelSpectrum};
