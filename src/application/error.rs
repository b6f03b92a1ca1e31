// Error taxonomy for the control command surface
use crate::domain::point::PointValidationError;
use crate::domain::settings::SettingsValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Malformed or missing input; nothing was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Bounds that leave no meaningful thresholds (`min_value >= max_value`).
    #[error("invalid range for '{id}': min_value ({min}) must be below max_value ({max})")]
    InvalidRange { id: String, min: f64, max: f64 },

    /// A store or transport operation failed; the caller may retry.
    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl ControlError {
    pub fn point_not_found(id: impl Into<String>) -> Self {
        ControlError::NotFound { kind: "control point", id: id.into() }
    }

    pub fn group_not_found(id: impl Into<String>) -> Self {
        ControlError::NotFound { kind: "control group", id: id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ControlError::Validation(message.into())
    }

    pub fn from_point(id: &str, error: PointValidationError) -> Self {
        match error {
            PointValidationError::DegenerateRange { min, max } => ControlError::InvalidRange {
                id: id.to_string(),
                min,
                max,
            },
            other => ControlError::Validation(other.to_string()),
        }
    }
}

impl From<SettingsValidationError> for ControlError {
    fn from(error: SettingsValidationError) -> Self {
        ControlError::Validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_range_maps_to_invalid_range() {
        let error = ControlError::from_point(
            "t-01",
            PointValidationError::DegenerateRange { min: 5.0, max: 1.0 },
        );
        assert!(matches!(error, ControlError::InvalidRange { ref id, .. } if id == "t-01"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ControlError::point_not_found("x").to_string(),
            "control point 'x' not found"
        );
        let error = ControlError::from_point("x", PointValidationError::MissingField("name"));
        assert_eq!(error.to_string(), "validation failed: field 'name' is required");
    }
}
