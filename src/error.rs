use thiserror::Error;

/// Pose tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("No new sensor sample available")]
    SensorUnavailable,

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Invalid tracker state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for tracking operations
pub type TrackResult<T> = Result<T, TrackingError>;

impl TrackingError {
    /// True for errors that only cost the current cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackingError::DegenerateGeometry(_)
                | TrackingError::SensorUnavailable
                | TrackingError::NumericDegeneracy(_)
        )
    }
}
