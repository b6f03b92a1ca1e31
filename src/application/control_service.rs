//! Control service - the command surface over points, groups and settings.
//!
//! Every point lives in its own slot guarded by an async mutex. A mutation
//! takes the slot lock and, while holding it, appends history, commits the
//! new point state and reserves a delivery ticket. The lock is released
//! before the envelope is delivered, so a slow observer never holds up the
//! next writer, while ticket order keeps every observer's view in commit
//! order. Two writers on the same point are applied one after the other as a
//! unit; writers on different points only share the brief map lookup.
//!
//! Lock order is points map, then groups, then a point slot. A new point's
//! slot is never locked by `create_point`: its ticket is taken under the
//! points map write lock, before any other writer can reach the slot.

use crate::application::broadcaster::{BroadcastReport, ChangeBroadcaster};
use crate::application::error::ControlError;
use crate::application::history_repository::HistoryRepository;
use crate::application::simulator::ValueSimulator;
use crate::domain::envelope::ChangeEnvelope;
use crate::domain::group::Group;
use crate::domain::history::{HistoricalData, HistoryRecord, TimeRange};
use crate::domain::point::Point;
use crate::domain::settings::SystemSettings;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug)]
struct PointEntry {
    point: Point,
    // Set by delete while holding the slot; late writers see NotFound.
    removed: bool,
}

type PointSlot = Arc<Mutex<PointEntry>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSummary {
    pub eligible: usize,
    pub advanced: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
    pub delivery: BroadcastReport,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("all {failed} eligible points failed, last error: {last_error}")]
    AllPointsFailed { failed: usize, last_error: String },
}

pub struct ControlService {
    points: RwLock<BTreeMap<String, PointSlot>>,
    groups: RwLock<BTreeMap<String, Group>>,
    settings: RwLock<SystemSettings>,
    history: Arc<dyn HistoryRepository>,
    broadcaster: Arc<ChangeBroadcaster>,
    simulator: Mutex<ValueSimulator>,
}

impl ControlService {
    pub async fn new(
        settings: SystemSettings,
        history: Arc<dyn HistoryRepository>,
        broadcaster: Arc<ChangeBroadcaster>,
        simulator: ValueSimulator,
    ) -> Self {
        history.set_max_records(settings.max_history_records()).await;
        Self {
            points: RwLock::new(BTreeMap::new()),
            groups: RwLock::new(BTreeMap::new()),
            settings: RwLock::new(settings),
            history,
            broadcaster,
            simulator: Mutex::new(simulator),
        }
    }

    pub fn broadcaster(&self) -> &Arc<ChangeBroadcaster> {
        &self.broadcaster
    }

    // ---- points -------------------------------------------------------

    /// All points in ascending id order.
    pub async fn list_points(&self) -> Vec<Point> {
        let slots = self.slots().await;
        let mut points = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            let entry = slot.lock().await;
            if !entry.removed {
                points.push(entry.point.clone());
            }
        }
        points
    }

    pub async fn get_point(&self, id: &str) -> Result<Point, ControlError> {
        let entry = self.lock_live(id).await?;
        Ok(entry.point.clone())
    }

    pub async fn create_point(&self, mut point: Point) -> Result<Point, ControlError> {
        point.validate().map_err(|e| ControlError::from_point(&point.id, e))?;
        point.timestamp.get_or_insert_with(Utc::now);
        point.refresh_status();

        let slot: PointSlot = Arc::new(Mutex::new(PointEntry {
            point: point.clone(),
            removed: false,
        }));
        let ticket = {
            let mut points = self.points.write().await;
            if points.contains_key(&point.id) {
                return Err(ControlError::validation(format!(
                    "control point '{}' already exists",
                    point.id
                )));
            }
            self.record_history(&point).await?;
            points.insert(point.id.clone(), slot);
            self.broadcaster.ticket()
        };

        tracing::info!(point_id = %point.id, status = %point.status, "Control point created");
        ticket.deliver(&ChangeEnvelope::Create(point.clone())).await;
        Ok(point)
    }

    /// Replace a point's definition. The timestamp is set to now and status
    /// recomputed; a present value is appended to history.
    pub async fn update_point(&self, id: &str, mut point: Point) -> Result<Point, ControlError> {
        if point.id != id {
            return Err(ControlError::validation(format!(
                "body id '{}' does not match path id '{}'",
                point.id, id
            )));
        }
        point.validate().map_err(|e| ControlError::from_point(id, e))?;

        let mut entry = self.lock_live(id).await?;
        point.timestamp = Some(Utc::now());
        point.refresh_status();
        self.commit(&mut entry, point.clone()).await?;
        let ticket = self.broadcaster.ticket();
        drop(entry);

        tracing::debug!(point_id = %id, status = %point.status, "Control point updated");
        ticket.deliver(&ChangeEnvelope::Update(point.clone())).await;
        Ok(point)
    }

    /// Set a point's value; same pipeline as a simulated update.
    pub async fn set_value(&self, id: &str, value: f64) -> Result<Point, ControlError> {
        if !value.is_finite() {
            return Err(ControlError::validation(format!(
                "value must be a finite number, got {value}"
            )));
        }

        let mut entry = self.lock_live(id).await?;
        let mut next = entry.point.clone();
        next.apply_value(value, Utc::now());
        self.commit(&mut entry, next.clone()).await?;
        let ticket = self.broadcaster.ticket();
        drop(entry);

        tracing::debug!(point_id = %id, value, status = %next.status, "Control point value set");
        ticket.deliver(&ChangeEnvelope::Update(next.clone())).await;
        Ok(next)
    }

    /// Remove a point and strip it from every group. History is left to age out.
    pub async fn delete_point(&self, id: &str) -> Result<(), ControlError> {
        let slot = {
            let mut points = self.points.write().await;
            let slot = points.remove(id).ok_or_else(|| ControlError::point_not_found(id))?;
            let mut groups = self.groups.write().await;
            for group in groups.values_mut() {
                if group.forget_point(id) {
                    tracing::debug!(point_id = %id, group_id = %group.id, "Removed point from group");
                }
            }
            slot
        };

        let ticket = {
            let mut entry = slot.lock().await;
            entry.removed = true;
            self.broadcaster.ticket()
        };
        tracing::info!(point_id = %id, "Control point deleted");
        ticket.deliver(&ChangeEnvelope::delete(id)).await;
        Ok(())
    }

    pub async fn get_history(&self, id: &str, range: TimeRange) -> Result<HistoricalData, ControlError> {
        if !self.points.read().await.contains_key(id) {
            return Err(ControlError::point_not_found(id));
        }
        self.history.query(id, range).await
    }

    // ---- simulation ---------------------------------------------------

    /// Advance every sensor once, in id order, then send one `simulate`
    /// envelope. A failing point is logged and skipped.
    pub async fn simulate(&self) -> Result<SweepSummary, SweepError> {
        let mut simulator = self.simulator.lock().await;
        let mut eligible = 0;
        let mut advanced = 0;
        let mut last_error = None;

        for (id, slot) in self.slots().await {
            let mut entry = slot.lock().await;
            if entry.removed || !entry.point.point_type.is_simulated() {
                continue;
            }
            eligible += 1;

            let mut next = entry.point.clone();
            let value = simulator.next_value(&next);
            next.apply_value(value, Utc::now());

            match self.commit(&mut entry, next).await {
                Ok(()) => advanced += 1,
                Err(e) => {
                    tracing::warn!(point_id = %id, "Skipping point in simulation sweep: {}", e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let failed = eligible - advanced;
        if eligible > 0 && advanced == 0 {
            return Err(SweepError::AllPointsFailed {
                failed,
                last_error: last_error.unwrap_or_default(),
            });
        }

        let timestamp = Utc::now();
        let delivery = self.broadcaster.broadcast(&ChangeEnvelope::simulate(timestamp)).await;
        tracing::debug!(eligible, advanced, failed, "Simulation sweep complete");

        Ok(SweepSummary {
            eligible,
            advanced,
            failed,
            timestamp,
            delivery,
        })
    }

    // ---- groups -------------------------------------------------------

    pub async fn list_groups(&self) -> Vec<Group> {
        self.groups.read().await.values().cloned().collect()
    }

    pub async fn get_group(&self, id: &str) -> Result<Group, ControlError> {
        self.groups
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::group_not_found(id))
    }

    pub async fn create_group(&self, group: Group) -> Result<Group, ControlError> {
        validate_group(&group)?;
        let points = self.points.read().await;
        ensure_members_exist(&group, &points)?;

        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(ControlError::validation(format!(
                "control group '{}' already exists",
                group.id
            )));
        }
        groups.insert(group.id.clone(), group.clone());
        tracing::info!(group_id = %group.id, members = group.points.len(), "Control group created");
        Ok(group)
    }

    pub async fn update_group(&self, id: &str, group: Group) -> Result<Group, ControlError> {
        if group.id != id {
            return Err(ControlError::validation(format!(
                "body id '{}' does not match path id '{}'",
                group.id, id
            )));
        }
        validate_group(&group)?;
        let points = self.points.read().await;
        ensure_members_exist(&group, &points)?;

        let mut groups = self.groups.write().await;
        let slot = groups.get_mut(id).ok_or_else(|| ControlError::group_not_found(id))?;
        *slot = group.clone();
        Ok(group)
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), ControlError> {
        match self.groups.write().await.remove(id) {
            Some(_) => {
                tracing::info!(group_id = %id, "Control group deleted");
                Ok(())
            }
            None => Err(ControlError::group_not_found(id)),
        }
    }

    // ---- settings -----------------------------------------------------

    pub async fn get_settings(&self) -> SystemSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, settings: SystemSettings) -> Result<SystemSettings, ControlError> {
        settings.validate()?;
        {
            let mut current = self.settings.write().await;
            *current = settings.clone();
        }
        self.history.set_max_records(settings.max_history_records()).await;
        tracing::info!(
            refresh_rate = settings.refresh_rate,
            data_retention_days = settings.data_retention_days,
            "System settings updated"
        );
        Ok(settings)
    }

    // ---- internals ----------------------------------------------------

    async fn slots(&self) -> Vec<(String, PointSlot)> {
        self.points
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect()
    }

    async fn lock_live(&self, id: &str) -> Result<OwnedMutexGuard<PointEntry>, ControlError> {
        let slot = self
            .points
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::point_not_found(id))?;
        let entry = slot.lock_owned().await;
        if entry.removed {
            return Err(ControlError::point_not_found(id));
        }
        Ok(entry)
    }

    async fn record_history(&self, point: &Point) -> Result<(), ControlError> {
        match (point.value, point.timestamp) {
            (Some(value), Some(at)) => self.history.append(&point.id, HistoryRecord::new(at, value)).await,
            _ => Ok(()),
        }
    }

    /// History first, then state: a failed append leaves the point untouched.
    async fn commit(&self, entry: &mut PointEntry, next: Point) -> Result<(), ControlError> {
        self.record_history(&next).await?;
        entry.point = next;
        Ok(())
    }
}

fn validate_group(group: &Group) -> Result<(), ControlError> {
    if group.id.trim().is_empty() {
        return Err(ControlError::validation("field 'id' is required"));
    }
    if group.name.trim().is_empty() {
        return Err(ControlError::validation("field 'name' is required"));
    }
    Ok(())
}

fn ensure_members_exist(group: &Group, points: &BTreeMap<String, PointSlot>) -> Result<(), ControlError> {
    match group.points.iter().find(|id| !points.contains_key(*id)) {
        Some(missing) => Err(ControlError::point_not_found(missing.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::broadcaster::tests::RecordingChannel;
    use crate::application::broadcaster::{ObserverChannel, ObserverSendError};
    use crate::application::simulator::tests::ScriptedRandom;
    use crate::domain::point::PointType;
    use crate::domain::status::PointStatus;
    use crate::infrastructure::memory_history::InMemoryHistory;
    use crate::infrastructure::ws_channel::queued_observer;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Fixture {
        service: Arc<ControlService>,
        observer: Arc<RecordingChannel>,
    }

    async fn fixture_with(history: Arc<dyn HistoryRepository>, fractions: Vec<f64>) -> Fixture {
        let broadcaster = Arc::new(ChangeBroadcaster::default());
        let observer = Arc::new(RecordingChannel::default());
        broadcaster.register(observer.clone()).await;
        let simulator = ValueSimulator::new(Box::new(ScriptedRandom::new(fractions)));
        let service = ControlService::new(SystemSettings::default(), history, broadcaster, simulator).await;
        Fixture {
            service: Arc::new(service),
            observer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryHistory::new(1000)), vec![]).await
    }

    fn thermometer(id: &str) -> Point {
        Point::new(id, "Thermometer", PointType::Sensor)
            .with_unit("°C")
            .with_bounds(0.0, 100.0)
            .with_value(50.0)
    }

    fn valve(id: &str) -> Point {
        Point::new(id, "Valve", PointType::Actuator)
            .with_unit("%")
            .with_bounds(0.0, 100.0)
            .with_value(20.0)
    }

    /// History backend that is always down.
    struct BrokenHistory;

    #[async_trait]
    impl HistoryRepository for BrokenHistory {
        async fn append(&self, _: &str, _: HistoryRecord) -> Result<(), ControlError> {
            Err(ControlError::Storage("history offline".into()))
        }
        async fn query(&self, point_id: &str, _: TimeRange) -> Result<HistoricalData, ControlError> {
            Ok(HistoricalData::empty(point_id))
        }
        async fn set_max_records(&self, _: usize) {}
    }

    /// In-memory history that refuses appends for one point.
    struct SelectiveHistory {
        inner: InMemoryHistory,
        failing: &'static str,
    }

    #[async_trait]
    impl HistoryRepository for SelectiveHistory {
        async fn append(&self, point_id: &str, record: HistoryRecord) -> Result<(), ControlError> {
            if point_id == self.failing {
                return Err(ControlError::Storage(format!("history shard for {point_id} offline")));
            }
            self.inner.append(point_id, record).await
        }
        async fn query(&self, point_id: &str, range: TimeRange) -> Result<HistoricalData, ControlError> {
            self.inner.query(point_id, range).await
        }
        async fn set_max_records(&self, max_records: usize) {
            self.inner.set_max_records(max_records).await;
        }
    }

    /// Takes a full second to accept every frame.
    struct SlowChannel;

    #[async_trait]
    impl ObserverChannel for SlowChannel {
        async fn send(&self, _payload: &str) -> Result<(), ObserverSendError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_recomputes_status_and_broadcasts() {
        let f = fixture().await;
        let mut point = thermometer("t-01").with_value(96.0);
        point.status = PointStatus::Normal;

        let created = f.service.create_point(point).await.unwrap();

        assert_eq!(created.status, PointStatus::Alarm);
        assert!(created.timestamp.is_some());
        let envelopes = f.observer.envelopes();
        assert_eq!(envelopes, vec![ChangeEnvelope::Create(created.clone())]);
        let history = f.service.get_history("t-01", TimeRange::unbounded()).await.unwrap();
        assert_eq!(history.values, vec![96.0]);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_input() {
        let f = fixture().await;
        f.service.create_point(thermometer("t-01")).await.unwrap();

        let duplicate = f.service.create_point(thermometer("t-01")).await;
        assert!(matches!(duplicate, Err(ControlError::Validation(_))));

        let nameless = Point::new("t-02", "", PointType::Sensor);
        assert!(matches!(
            f.service.create_point(nameless).await,
            Err(ControlError::Validation(_))
        ));

        let inverted = thermometer("t-03").with_bounds(10.0, 5.0);
        assert!(matches!(
            f.service.create_point(inverted).await,
            Err(ControlError::InvalidRange { .. })
        ));

        assert_eq!(f.service.list_points().await.len(), 1);
        assert_eq!(f.observer.envelopes().len(), 1);
    }

    #[tokio::test]
    async fn test_set_value_runs_full_pipeline() {
        let f = fixture().await;
        f.service.create_point(valve("a-01")).await.unwrap();

        let updated = f.service.set_value("a-01", 100.0).await.unwrap();

        assert_eq!(updated.value, Some(100.0));
        assert_eq!(updated.status, PointStatus::Error);
        assert_eq!(f.service.get_point("a-01").await.unwrap(), updated);
        let history = f.service.get_history("a-01", TimeRange::unbounded()).await.unwrap();
        assert_eq!(history.values, vec![20.0, 100.0]);
        assert_eq!(f.observer.envelopes().last(), Some(&ChangeEnvelope::Update(updated)));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found_without_side_effects() {
        let f = fixture().await;
        assert!(matches!(
            f.service.set_value("ghost", 1.0).await,
            Err(ControlError::NotFound { .. })
        ));
        assert!(matches!(
            f.service.update_point("ghost", thermometer("ghost")).await,
            Err(ControlError::NotFound { .. })
        ));
        assert!(matches!(f.service.delete_point("ghost").await, Err(ControlError::NotFound { .. })));
        assert!(matches!(
            f.service.get_history("ghost", TimeRange::unbounded()).await,
            Err(ControlError::NotFound { .. })
        ));
        assert!(f.observer.envelopes().is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_matching_id() {
        let f = fixture().await;
        f.service.create_point(thermometer("t-01")).await.unwrap();
        let result = f.service.update_point("t-01", thermometer("t-02")).await;
        assert!(matches!(result, Err(ControlError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_groups() {
        let f = fixture().await;
        f.service.create_point(thermometer("t-01")).await.unwrap();
        f.service.create_point(valve("a-01")).await.unwrap();
        f.service
            .create_group(Group::new("g1", "Boiler").with_points(["t-01", "a-01"]))
            .await
            .unwrap();
        f.service
            .create_group(Group::new("g2", "Temps").with_points(["t-01"]))
            .await
            .unwrap();

        f.service.delete_point("t-01").await.unwrap();

        let g1 = f.service.get_group("g1").await.unwrap();
        let g2 = f.service.get_group("g2").await.unwrap();
        assert_eq!(g1.points.iter().collect::<Vec<_>>(), vec!["a-01"]);
        assert!(g2.points.is_empty());
        assert!(matches!(f.service.get_point("t-01").await, Err(ControlError::NotFound { .. })));
        assert_eq!(f.observer.envelopes().last(), Some(&ChangeEnvelope::delete("t-01")));
    }

    #[tokio::test]
    async fn test_group_members_must_exist() {
        let f = fixture().await;
        let result = f.service.create_group(Group::new("g1", "Ghosts").with_points(["nope"])).await;
        assert!(matches!(result, Err(ControlError::NotFound { ref id, .. }) if id == "nope"));
        assert!(f.service.list_groups().await.is_empty());

        f.service.create_group(Group::new("g1", "Empty")).await.unwrap();
        assert!(matches!(
            f.service.update_group("g9", Group::new("g9", "Other")).await,
            Err(ControlError::NotFound { .. })
        ));
        f.service.delete_group("g1").await.unwrap();
        assert!(matches!(f.service.delete_group("g1").await, Err(ControlError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_sweep_only_advances_sensors_and_broadcasts_once() {
        // fraction 1.0 is the top of the +-0.5 temperature step
        let f = fixture_with(Arc::new(InMemoryHistory::new(1000)), vec![1.0, 1.0]).await;
        f.service.create_point(thermometer("t-01")).await.unwrap();
        f.service.create_point(thermometer("t-02").with_value(80.0)).await.unwrap();
        f.service.create_point(valve("a-01")).await.unwrap();
        let before = f.observer.envelopes().len();

        let summary = f.service.simulate().await.unwrap();

        assert_eq!(summary.eligible, 2);
        assert_eq!(summary.advanced, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(f.service.get_point("t-01").await.unwrap().value, Some(50.5));
        assert_eq!(f.service.get_point("t-02").await.unwrap().value, Some(80.5));
        assert_eq!(f.service.get_point("a-01").await.unwrap().value, Some(20.0));

        let envelopes = f.observer.envelopes();
        assert_eq!(envelopes.len(), before + 1);
        assert!(matches!(envelopes.last(), Some(ChangeEnvelope::Simulate { .. })));
    }

    #[tokio::test]
    async fn test_sweep_with_no_sensors_still_notifies() {
        let f = fixture().await;
        f.service.create_point(valve("a-01")).await.unwrap();
        let summary = f.service.simulate().await.unwrap();
        assert_eq!(summary.eligible, 0);
        assert_eq!(summary.delivery.delivered, 1);
    }

    #[tokio::test]
    async fn test_failing_history_keeps_point_state_intact() {
        let f = fixture_with(Arc::new(BrokenHistory), vec![]).await;

        // value-less sensors need no history on create
        let created = f
            .service
            .create_point(Point::new("t-01", "T", PointType::Sensor).with_bounds(0.0, 100.0))
            .await
            .unwrap();

        assert!(matches!(
            f.service.set_value("t-01", 42.0).await,
            Err(ControlError::Storage(_))
        ));
        assert_eq!(f.service.get_point("t-01").await.unwrap(), created);

        let sweep = f.service.simulate().await;
        assert!(matches!(sweep, Err(SweepError::AllPointsFailed { failed: 1, .. })));
        assert_eq!(f.service.get_point("t-01").await.unwrap().value, None);
    }

    #[tokio::test]
    async fn test_failing_point_does_not_abort_sweep() {
        let history = SelectiveHistory {
            inner: InMemoryHistory::new(1000),
            failing: "t-02",
        };
        let f = fixture_with(Arc::new(history), vec![1.0, 1.0, 1.0]).await;
        f.service.create_point(thermometer("t-01")).await.unwrap();
        // no value yet, so creating it needs no history
        let unseeded = Point::new("t-02", "T", PointType::Sensor)
            .with_unit("°C")
            .with_bounds(0.0, 100.0);
        f.service.create_point(unseeded).await.unwrap();
        f.service.create_point(thermometer("t-03")).await.unwrap();
        let before = f.observer.envelopes().len();

        let summary = f.service.simulate().await.unwrap();

        assert_eq!(summary.eligible, 3);
        assert_eq!(summary.advanced, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(f.service.get_point("t-01").await.unwrap().value, Some(50.5));
        assert_eq!(f.service.get_point("t-02").await.unwrap().value, None);
        assert_eq!(f.service.get_point("t-03").await.unwrap().value, Some(50.5));

        let envelopes = f.observer.envelopes();
        let sweep_envelopes = &envelopes[before..];
        assert_eq!(sweep_envelopes.len(), 1);
        assert!(matches!(sweep_envelopes[0], ChangeEnvelope::Simulate { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_client_queue_does_not_slow_writers() {
        let f = fixture().await;
        let (stalled, _undrained) = queued_observer(1);
        f.service.broadcaster().register(Arc::new(stalled)).await;
        f.service.create_point(valve("a-01")).await.unwrap();

        let started = Instant::now();
        for i in 0..5 {
            f.service.set_value("a-01", 30.0 + i as f64).await.unwrap();
        }

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(f.observer.envelopes().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_delivery_releases_point_lock() {
        let f = fixture().await;
        f.service.create_point(valve("a-01")).await.unwrap();
        f.service.broadcaster().register(Arc::new(SlowChannel)).await;

        let writer = {
            let service = f.service.clone();
            tokio::spawn(async move { service.set_value("a-01", 30.0).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // the writer is still delivering, yet the point is readable
        let started = Instant::now();
        assert_eq!(f.service.get_point("a-01").await.unwrap().value, Some(30.0));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!writer.is_finished());

        writer.await.unwrap();
        let last = f.observer.envelopes().pop().unwrap();
        assert_eq!(last.point_id(), Some("a-01"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_one_point_are_serialized() {
        let f = fixture().await;
        f.service.create_point(valve("a-01")).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let service = f.service.clone();
            tasks.push(tokio::spawn(async move {
                service.set_value("a-01", 30.0 + i as f64).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let history = f.service.get_history("a-01", TimeRange::unbounded()).await.unwrap();
        assert_eq!(history.len(), 21);
        let last_value = *history.values.last().unwrap();
        let point = f.service.get_point("a-01").await.unwrap();
        assert_eq!(point.value, Some(last_value));
        assert_eq!(point.status, crate::domain::status::classify(point.value, Some(0.0), Some(100.0)));
    }

    #[tokio::test]
    async fn test_settings_update_validates_and_resizes_history() {
        let f = fixture().await;
        f.service.create_point(valve("a-01")).await.unwrap();

        let mut settings = f.service.get_settings().await;
        settings.data_retention_days = 1;
        settings.refresh_rate = 2;
        f.service.update_settings(settings.clone()).await.unwrap();
        assert_eq!(f.service.get_settings().await, settings);

        for i in 0..300 {
            f.service.set_value("a-01", (i % 100) as f64).await.unwrap();
        }
        let history = f.service.get_history("a-01", TimeRange::unbounded()).await.unwrap();
        assert_eq!(history.len(), 288);
        assert_eq!(history.values.last(), Some(&99.0));

        settings.refresh_rate = 0;
        assert!(matches!(
            f.service.update_settings(settings).await,
            Err(ControlError::Validation(_))
        ));
        assert_eq!(f.service.get_settings().await.refresh_rate, 2);
    }
}
