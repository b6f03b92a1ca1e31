//! Client reconciler - keeps an observer-side mirror of the point set.
//!
//! The mirror remembers, per point id, the last applied
//! `(value, status, timestamp)` triple and the card rendered for it. New
//! state is diffed against the mirror so only created, changed or removed
//! points touch the renderer. Full refreshes are rate limited by a cooldown;
//! a refresh that arrives inside the window is dropped.

use crate::domain::envelope::ChangeEnvelope;
use crate::domain::point::Point;
use crate::domain::status::PointStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
}

/// Draws and removes cards for points.
pub trait CardRenderer: Send {
    type Card: Send;

    fn create_card(&mut self, point: &Point) -> Self::Card;

    fn destroy_card(&mut self, card: Self::Card);

    /// Redraw for a changed point. Destroy-and-recreate unless overridden.
    fn replace_card(&mut self, card: Self::Card, point: &Point) -> Self::Card {
        self.destroy_card(card);
        self.create_card(point)
    }

    /// Inline error with a retry affordance.
    fn show_error(&mut self, message: &str);

    fn clear_error(&mut self);

    fn show_empty(&mut self) {}
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_points(&self) -> Result<Vec<Point>, ClientError>;
}

struct MirrorEntry<C> {
    value: Option<f64>,
    status: PointStatus,
    timestamp: Option<DateTime<Utc>>,
    card: C,
}

impl<C> MirrorEntry<C> {
    fn matches(&self, point: &Point) -> bool {
        self.value == point.value && self.status == point.status && self.timestamp == point.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointChange {
    Created,
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl ReconcileReport {
    /// True when nothing was redrawn.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    fn record(&mut self, id: &str, change: PointChange) {
        match change {
            PointChange::Created => self.created.push(id.to_string()),
            PointChange::Changed => self.changed.push(id.to_string()),
            PointChange::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(ReconcileReport),
    /// Dropped because the previous refresh is still inside the cooldown.
    Throttled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeOutcome {
    Applied(ReconcileReport),
    /// The envelope only says "something moved"; the caller should refresh.
    RefreshRequested,
}

pub struct ClientReconciler<R: CardRenderer> {
    renderer: R,
    mirror: HashMap<String, MirrorEntry<R::Card>>,
    cooldown: Duration,
    last_refresh: Option<Instant>,
    error: Option<String>,
}

impl<R: CardRenderer> ClientReconciler<R> {
    pub fn new(renderer: R, cooldown: Duration) -> Self {
        Self {
            renderer,
            mirror: HashMap::new(),
            cooldown,
            last_refresh: None,
            error: None,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.mirror.contains_key(id)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Diff a full snapshot against the mirror.
    pub fn apply_snapshot(&mut self, points: &[Point]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let incoming: HashSet<&str> = points.iter().map(|p| p.id.as_str()).collect();

        let stale: Vec<String> = self
            .mirror
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if self.remove_point(&id) {
                report.removed.push(id);
            }
        }

        for point in points {
            let change = self.apply_point(point);
            report.record(&point.id, change);
        }

        if self.mirror.is_empty() {
            self.renderer.show_empty();
        }
        report
    }

    /// Apply a single point's latest state.
    pub fn apply_point(&mut self, point: &Point) -> PointChange {
        let Some(entry) = self.mirror.remove(&point.id) else {
            let card = self.renderer.create_card(point);
            self.insert(point, card);
            return PointChange::Created;
        };

        if entry.matches(point) {
            self.mirror.insert(point.id.clone(), entry);
            return PointChange::Unchanged;
        }

        let card = self.renderer.replace_card(entry.card, point);
        self.insert(point, card);
        PointChange::Changed
    }

    pub fn remove_point(&mut self, id: &str) -> bool {
        match self.mirror.remove(id) {
            Some(entry) => {
                self.renderer.destroy_card(entry.card);
                true
            }
            None => false,
        }
    }

    pub fn apply_envelope(&mut self, envelope: &ChangeEnvelope) -> EnvelopeOutcome {
        let mut report = ReconcileReport::default();
        match envelope {
            ChangeEnvelope::Create(point) | ChangeEnvelope::Update(point) => {
                let change = self.apply_point(point);
                report.record(&point.id, change);
            }
            ChangeEnvelope::Delete { id } => {
                if self.remove_point(id) {
                    report.removed.push(id.clone());
                }
            }
            ChangeEnvelope::Simulate { .. } => return EnvelopeOutcome::RefreshRequested,
        }
        EnvelopeOutcome::Applied(report)
    }

    /// Fetch and apply a snapshot unless the cooldown window is still open.
    pub async fn refresh<S: SnapshotSource + ?Sized>(&mut self, source: &S) -> RefreshOutcome {
        let now = Instant::now();
        let cooling = self
            .last_refresh
            .is_some_and(|last| now.duration_since(last) < self.cooldown);
        if cooling {
            tracing::debug!("Refresh dropped inside cooldown window");
            return RefreshOutcome::Throttled;
        }
        self.last_refresh = Some(now);
        self.fetch_and_apply(source).await
    }

    /// Manual retry from the error state; ignores the cooldown.
    pub async fn retry<S: SnapshotSource + ?Sized>(&mut self, source: &S) -> RefreshOutcome {
        self.last_refresh = Some(Instant::now());
        self.fetch_and_apply(source).await
    }

    /// Enter the error state. The mirror and its cards are kept as they are.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Observer error: {}", message);
        self.renderer.show_error(&message);
        self.error = Some(message);
    }

    async fn fetch_and_apply<S: SnapshotSource + ?Sized>(&mut self, source: &S) -> RefreshOutcome {
        match source.fetch_points().await {
            Ok(points) => {
                if self.error.take().is_some() {
                    self.renderer.clear_error();
                }
                RefreshOutcome::Applied(self.apply_snapshot(&points))
            }
            Err(e) => {
                let message = format!("Error loading control points: {e}");
                self.fail(message.clone());
                RefreshOutcome::Failed(message)
            }
        }
    }

    fn insert(&mut self, point: &Point, card: R::Card) {
        self.mirror.insert(
            point.id.clone(),
            MirrorEntry {
                value: point.value,
                status: point.status,
                timestamp: point.timestamp,
                card,
            },
        );
    }
}
