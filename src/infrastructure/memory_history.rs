// In-memory history repository implementation
use crate::application::error::ControlError;
use crate::application::history_repository::HistoryRepository;
use crate::domain::history::{HistoricalData, HistoryRecord, TimeRange};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct InMemoryHistory {
    series: RwLock<HashMap<String, VecDeque<HistoryRecord>>>,
    max_records: AtomicUsize,
}

impl InMemoryHistory {
    pub fn new(max_records: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_records: AtomicUsize::new(max_records.max(1)),
        }
    }
}

/// Insert keeping ascending order; equal timestamps keep arrival order.
fn insert_ordered(records: &mut VecDeque<HistoryRecord>, record: HistoryRecord) {
    let in_order = records.back().is_none_or(|last| last.timestamp <= record.timestamp);
    if in_order {
        records.push_back(record);
    } else {
        let at = records.partition_point(|existing| existing.timestamp <= record.timestamp);
        records.insert(at, record);
    }
}

fn trim_oldest(records: &mut VecDeque<HistoryRecord>, max_records: usize) -> usize {
    let excess = records.len().saturating_sub(max_records);
    records.drain(..excess);
    excess
}

#[async_trait]
impl HistoryRepository for InMemoryHistory {
    async fn append(&self, point_id: &str, record: HistoryRecord) -> Result<(), ControlError> {
        let max_records = self.max_records.load(Ordering::Relaxed);
        let mut series = self.series.write().await;
        let records = series.entry(point_id.to_string()).or_default();

        insert_ordered(records, record);
        let dropped = trim_oldest(records, max_records);
        if dropped > 0 {
            tracing::debug!(point_id = %point_id, dropped, max_records, "Trimmed history");
        }
        Ok(())
    }

    async fn query(&self, point_id: &str, range: TimeRange) -> Result<HistoricalData, ControlError> {
        let series = self.series.read().await;
        let Some(records) = series.get(point_id) else {
            return Ok(HistoricalData::empty(point_id));
        };

        let start = range
            .start
            .map_or(0, |start| records.partition_point(|r| r.timestamp < start));
        let end = range
            .end
            .map_or(records.len(), |end| records.partition_point(|r| r.timestamp <= end));

        if start >= end {
            return Ok(HistoricalData::empty(point_id));
        }
        Ok(HistoricalData::from_records(point_id, records.range(start..end)))
    }

    async fn set_max_records(&self, max_records: usize) {
        self.max_records.store(max_records.max(1), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[tokio::test]
    async fn test_retention_keeps_most_recent() {
        let store = InMemoryHistory::new(100);
        for i in 0..101 {
            store.append("t-01", HistoryRecord::new(at(i), i as f64)).await.unwrap();
        }

        let data = store.query("t-01", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(data.timestamps.len(), data.values.len());
        assert_eq!(data.values.first(), Some(&1.0));
        assert_eq!(data.values.last(), Some(&100.0));
        let expected: Vec<f64> = (1..101).map(|i| i as f64).collect();
        assert_eq!(data.values, expected);
    }

    #[tokio::test]
    async fn test_out_of_order_append_is_sorted() {
        let store = InMemoryHistory::new(10);
        for (i, value) in [(30, 3.0), (10, 1.0), (20, 2.0), (40, 4.0)] {
            store.append("p", HistoryRecord::new(at(i), value)).await.unwrap();
        }

        let data = store.query("p", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data.values, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(data.timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_trim_after_late_record_drops_chronologically_oldest() {
        let store = InMemoryHistory::new(3);
        for i in [10, 20, 30] {
            store.append("p", HistoryRecord::new(at(i), i as f64)).await.unwrap();
        }
        store.append("p", HistoryRecord::new(at(5), 5.0)).await.unwrap();

        let data = store.query("p", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data.values, vec![10.0, 20.0, 30.0]);
    }

    #[tokio::test]
    async fn test_query_window_is_inclusive() {
        let store = InMemoryHistory::new(100);
        for i in 0..10 {
            store.append("p", HistoryRecord::new(at(i * 60), i as f64)).await.unwrap();
        }

        let data = store.query("p", TimeRange::new(Some(at(120)), Some(at(300)))).await.unwrap();
        assert_eq!(data.values, vec![2.0, 3.0, 4.0, 5.0]);

        let data = store.query("p", TimeRange::new(None, Some(at(60)))).await.unwrap();
        assert_eq!(data.values, vec![0.0, 1.0]);

        let data = store.query("p", TimeRange::new(Some(at(480)), None)).await.unwrap();
        assert_eq!(data.values, vec![8.0, 9.0]);

        let data = store.query("p", TimeRange::new(Some(at(300)), Some(at(120)))).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_point_is_empty() {
        let store = InMemoryHistory::new(10);
        let data = store.query("missing", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data, HistoricalData::empty("missing"));
    }

    #[tokio::test]
    async fn test_shrinking_retention_applies_on_next_append() {
        let store = InMemoryHistory::new(10);
        for i in 0..10 {
            store.append("p", HistoryRecord::new(at(i), i as f64)).await.unwrap();
        }
        store.set_max_records(4).await;
        let data = store.query("p", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data.len(), 10);

        store.append("p", HistoryRecord::new(at(10), 10.0)).await.unwrap();
        let data = store.query("p", TimeRange::unbounded()).await.unwrap();
        assert_eq!(data.values, vec![7.0, 8.0, 9.0, 10.0]);
    }
}
