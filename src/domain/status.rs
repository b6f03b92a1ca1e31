// Status classification - derives a point's health from its value and bounds
use serde::{Deserialize, Serialize};

/// Fraction of the range, measured in from either bound, that counts as warning.
pub const WARNING_BAND: f64 = 0.10;
/// Fraction of the range, measured in from either bound, that counts as alarm.
pub const ALARM_BAND: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    #[default]
    Unknown,
    Normal,
    Warning,
    Alarm,
    Error,
}

impl PointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointStatus::Unknown => "unknown",
            PointStatus::Normal => "normal",
            PointStatus::Warning => "warning",
            PointStatus::Alarm => "alarm",
            PointStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for PointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a value against its bounds.
///
/// Bands are inclusive and a boundary value belongs to the stricter band:
/// touching `min`/`max` is `Error`, the outer 5% is `Alarm`, the outer 10%
/// is `Warning`. A degenerate range (`max <= min`) or a non-finite value has
/// no meaningful thresholds and is classified as `Error`.
pub fn classify(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> PointStatus {
    let (Some(value), Some(min), Some(max)) = (value, min, max) else {
        return PointStatus::Unknown;
    };

    if !value.is_finite() || !has_valid_range(min, max) {
        return PointStatus::Error;
    }

    let range = max - min;
    let warn_low = min + range * WARNING_BAND;
    let warn_high = max - range * WARNING_BAND;
    let alarm_low = min + range * ALARM_BAND;
    let alarm_high = max - range * ALARM_BAND;

    if value <= min || value >= max {
        PointStatus::Error
    } else if value <= alarm_low || value >= alarm_high {
        PointStatus::Alarm
    } else if value <= warn_low || value >= warn_high {
        PointStatus::Warning
    } else {
        PointStatus::Normal
    }
}

/// True when both bounds are finite and `min < max`.
pub fn has_valid_range(min: f64, max: f64) -> bool {
    min.is_finite() && max.is_finite() && min < max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(value: f64) -> PointStatus {
        classify(Some(value), Some(0.0), Some(100.0))
    }

    #[test]
    fn test_missing_inputs_are_unknown() {
        assert_eq!(classify(None, Some(0.0), Some(100.0)), PointStatus::Unknown);
        assert_eq!(classify(Some(50.0), None, Some(100.0)), PointStatus::Unknown);
        assert_eq!(classify(Some(50.0), Some(0.0), None), PointStatus::Unknown);
    }

    #[test]
    fn test_scenarios() {
        assert_eq!(status(50.0), PointStatus::Normal);
        assert_eq!(status(94.0), PointStatus::Warning);
        assert_eq!(status(96.0), PointStatus::Alarm);
        assert_eq!(status(100.0), PointStatus::Error);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        assert_eq!(status(0.0), PointStatus::Error);
        assert_eq!(status(-3.0), PointStatus::Error);
        assert_eq!(status(120.0), PointStatus::Error);
        assert_eq!(status(5.0), PointStatus::Alarm);
        assert_eq!(status(95.0), PointStatus::Alarm);
        assert_eq!(status(10.0), PointStatus::Warning);
        assert_eq!(status(90.0), PointStatus::Warning);
        assert_eq!(status(10.5), PointStatus::Normal);
        assert_eq!(status(89.5), PointStatus::Normal);
    }

    #[test]
    fn test_offset_range() {
        // range 200, warning band 20, alarm band 10
        assert_eq!(classify(Some(-80.0), Some(-100.0), Some(100.0)), PointStatus::Warning);
        assert_eq!(classify(Some(-90.0), Some(-100.0), Some(100.0)), PointStatus::Alarm);
        assert_eq!(classify(Some(0.0), Some(-100.0), Some(100.0)), PointStatus::Normal);
    }

    #[test]
    fn test_degenerate_range_is_error() {
        assert_eq!(classify(Some(5.0), Some(10.0), Some(10.0)), PointStatus::Error);
        assert_eq!(classify(Some(5.0), Some(20.0), Some(10.0)), PointStatus::Error);
        assert_eq!(classify(Some(f64::NAN), Some(0.0), Some(10.0)), PointStatus::Error);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for value in [0.0, 4.99, 5.0, 9.99, 42.0, 90.0, 99.9] {
            assert_eq!(status(value), status(value));
        }
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&PointStatus::Alarm).unwrap(), "\"alarm\"");
        let parsed: PointStatus = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(parsed, PointStatus::Warning);
    }
}
