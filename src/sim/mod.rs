pub mod dataset;
pub mod energy;
pub mod engine;
pub mod precision;
pub mod rays;
pub mod tracer;
