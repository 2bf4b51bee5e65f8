use serde::{Deserialize, Serialize};

use crate::sim::tracer::{ColorMap, ScalarRange};

/// Configuration for one energy render.
///
/// Loaded by callers (e.g. from JSON) and pushed onto a bound
/// [`EnergyEngine`](super::EnergyEngine) with `apply_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Absorption field: `num_cells * num_bins` values.
    pub primary_field: String,
    /// Emission field. Empty disables emission.
    pub secondary_field: String,

    /// Intensity normalization factor passed to the tracer.
    pub unit_scalar: f32,
    pub color_map: ColorMap,
    /// Scalar range override. `None` keeps the range computed from the field.
    pub primary_range: Option<ScalarRange>,

    // Background
    pub composite_background: bool,
    /// Per-bin background blended into every merged pixel.
    /// Only used when `composite_background` is set.
    pub background: Option<Vec<f64>>,
}

impl EnergyConfig {
    pub fn new() -> Self {
        Self {
            primary_field: String::new(),
            secondary_field: String::new(),
            unit_scalar: 1.0,
            color_map: ColorMap::default(),
            primary_range: None,
            composite_background: true,
            background: None,
        }
    }

    pub fn with_fields(primary: &str, secondary: &str) -> Self {
        Self {
            primary_field: primary.to_string(),
            secondary_field: secondary.to_string(),
            ..Self::new()
        }
    }

    pub fn has_emission(&self) -> bool {
        !self.secondary_field.is_empty()
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EnergyConfig::new();
        assert!(config.primary_field.is_empty());
        assert!(!config.has_emission());
        assert!((config.unit_scalar - 1.0).abs() < 1e-6);
        assert!(config.composite_background);
        assert!(config.background.is_none());
    }

    #[test]
    fn test_config_default_trait() {
        let config: EnergyConfig = Default::default();
        assert_eq!(config, EnergyConfig::new());
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "primary_field": "absorption",
            "secondary_field": "emission",
            "unit_scalar": 0.01,
            "background": [1.0, 0.5]
        }"#;
        let config: EnergyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.primary_field, "absorption");
        assert!(config.has_emission());
        assert!((config.unit_scalar - 0.01).abs() < 1e-6);
        assert!(config.composite_background);
        assert_eq!(config.background, Some(vec![1.0, 0.5]));
    }
}
