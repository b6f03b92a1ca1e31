// Repository trait for per-point history
use crate::application::error::ControlError;
use crate::domain::history::{HistoricalData, HistoryRecord, TimeRange};
use async_trait::async_trait;

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Insert a record. Afterwards the point's records are time-ordered and
    /// hold at most the configured number of entries, oldest dropped first.
    async fn append(&self, point_id: &str, record: HistoryRecord) -> Result<(), ControlError>;

    /// Records inside `range`, ascending. Unknown ids yield empty sequences.
    async fn query(&self, point_id: &str, range: TimeRange) -> Result<HistoricalData, ControlError>;

    /// Change the per-point capacity; applied on each point's next append.
    async fn set_max_records(&self, max_records: usize);
}
