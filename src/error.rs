//! Error types shared by the binning controller and the partial compositor.

/// Failure kinds raised while configuring a render or compositing partials.
///
/// `Configuration` means the caller has to fix its inputs (bind a dataset,
/// pick a valid field). `InvariantViolation` means an internal contract was
/// broken and the current operation must stop.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl TraceError {
    pub fn configuration<T: ToString>(msg: T) -> Self {
        TraceError::Configuration(msg.to_string())
    }

    pub fn invariant<T: ToString>(msg: T) -> Self {
        TraceError::InvariantViolation(msg.to_string())
    }

    /// True for errors the caller can recover from by changing its configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TraceError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
