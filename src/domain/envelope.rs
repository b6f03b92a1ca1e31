// Change envelopes pushed to every connected observer
use super::point::Point;
use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "lowercase")]
pub enum ChangeEnvelope {
    Create(Point),
    Update(Point),
    Delete {
        id: String,
    },
    /// One per simulation sweep, never one per point.
    Simulate {
        #[serde(with = "timestamp::iso")]
        timestamp: DateTime<Utc>,
    },
}

impl ChangeEnvelope {
    pub fn delete(id: impl Into<String>) -> Self {
        ChangeEnvelope::Delete { id: id.into() }
    }

    pub fn simulate(timestamp: DateTime<Utc>) -> Self {
        ChangeEnvelope::Simulate { timestamp }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ChangeEnvelope::Create(_) => "create",
            ChangeEnvelope::Update(_) => "update",
            ChangeEnvelope::Delete { .. } => "delete",
            ChangeEnvelope::Simulate { .. } => "simulate",
        }
    }

    /// Id of the single point this envelope is about, if any.
    pub fn point_id(&self) -> Option<&str> {
        match self {
            ChangeEnvelope::Create(point) | ChangeEnvelope::Update(point) => Some(&point.id),
            ChangeEnvelope::Delete { id } => Some(id),
            ChangeEnvelope::Simulate { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::point::PointType;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_delete_wire_shape() {
        let json = serde_json::to_value(ChangeEnvelope::delete("t-01")).unwrap();
        assert_eq!(json, json!({"action": "delete", "data": {"id": "t-01"}}));
    }

    #[test]
    fn test_simulate_wire_shape() {
        let at = Utc.with_ymd_and_hms(2024, 10, 1, 15, 0, 0).unwrap();
        let json = serde_json::to_value(ChangeEnvelope::simulate(at)).unwrap();
        assert_eq!(
            json,
            json!({"action": "simulate", "data": {"timestamp": "2024-10-01T15:00:00+00:00"}})
        );
    }

    #[test]
    fn test_update_carries_full_point() {
        let point = Point::new("a-01", "Valve", PointType::Actuator).with_bounds(0.0, 100.0).with_value(50.0);
        let envelope = ChangeEnvelope::Update(point.clone());
        let text = serde_json::to_string(&envelope).unwrap();
        let decoded: ChangeEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.action(), "update");
        assert_eq!(decoded.point_id(), Some("a-01"));
    }
}
