// Historical data domain models
use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl HistoryRecord {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Query window; either side may be open. Both ends are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Response shape for a history query: parallel ascending sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalData {
    pub point_id: String,
    #[serde(with = "timestamp::iso_seq")]
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl HistoricalData {
    pub fn empty(point_id: impl Into<String>) -> Self {
        Self {
            point_id: point_id.into(),
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn from_records<'a, I>(point_id: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = &'a HistoryRecord>,
    {
        let (timestamps, values) = records
            .into_iter()
            .map(|record| (record.timestamp, record.value))
            .unzip();
        Self {
            point_id: point_id.into(),
            timestamps,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_wire_shape() {
        let records = [HistoryRecord::new(at(1), 1.5), HistoryRecord::new(at(2), 2.5)];
        let data = HistoricalData::from_records("t-01", records.iter());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["point_id"], "t-01");
        assert_eq!(json["timestamps"][0], "2024-05-01T12:01:00+00:00");
        assert_eq!(json["values"], serde_json::json!([1.5, 2.5]));
    }
}
