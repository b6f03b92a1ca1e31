// Control point domain model
use super::status::{classify, has_valid_range, PointStatus};
use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of control point. Only sensors are auto-simulated; anything that is
/// not one of the known kinds is carried as a custom tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PointType {
    Sensor,
    Actuator,
    Scale,
    Custom(String),
}

impl PointType {
    pub fn as_str(&self) -> &str {
        match self {
            PointType::Sensor => "sensor",
            PointType::Actuator => "actuator",
            PointType::Scale => "scale",
            PointType::Custom(tag) => tag,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, PointType::Sensor)
    }
}

impl From<String> for PointType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "sensor" => PointType::Sensor,
            "actuator" => PointType::Actuator,
            "scale" => PointType::Scale,
            _ => PointType::Custom(tag),
        }
    }
}

impl From<PointType> for String {
    fn from(kind: PointType) -> Self {
        match kind {
            PointType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for PointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default, with = "timestamp::iso_option")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Always derived from value and bounds; whatever a caller sends is replaced.
    #[serde(default)]
    pub status: PointStatus,
    #[serde(rename = "type")]
    pub point_type: PointType,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PointValidationError {
    #[error("field '{0}' is required")]
    MissingField(&'static str),

    #[error("field '{field}' must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("min_value ({min}) must be below max_value ({max})")]
    DegenerateRange { min: f64, max: f64 },
}

impl Point {
    pub fn new(id: impl Into<String>, name: impl Into<String>, point_type: PointType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            value: None,
            unit: None,
            min_value: None,
            max_value: None,
            timestamp: None,
            status: PointStatus::Unknown,
            point_type,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self.refresh_status();
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self.refresh_status();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Recompute `status` from the current value and bounds.
    pub fn refresh_status(&mut self) {
        self.status = classify(self.value, self.min_value, self.max_value);
    }

    /// Set a new value observed at `at`; status follows.
    pub fn apply_value(&mut self, value: f64, at: DateTime<Utc>) {
        self.value = Some(value);
        self.timestamp = Some(at);
        self.refresh_status();
    }

    /// Check required fields and numeric sanity. Independent of the stored state.
    pub fn validate(&self) -> Result<(), PointValidationError> {
        if self.id.trim().is_empty() {
            return Err(PointValidationError::MissingField("id"));
        }
        if self.name.trim().is_empty() {
            return Err(PointValidationError::MissingField("name"));
        }
        if matches!(&self.point_type, PointType::Custom(tag) if tag.trim().is_empty()) {
            return Err(PointValidationError::MissingField("type"));
        }

        let numbers = [
            ("value", self.value),
            ("min_value", self.min_value),
            ("max_value", self.max_value),
        ];
        for (field, number) in numbers {
            match number {
                Some(value) if !value.is_finite() => {
                    return Err(PointValidationError::NotFinite { field, value });
                }
                _ => {}
            }
        }

        match (self.min_value, self.max_value) {
            (Some(min), Some(max)) if !has_valid_range(min, max) => {
                Err(PointValidationError::DegenerateRange { min, max })
            }
            _ => Ok(()),
        }
    }
}
