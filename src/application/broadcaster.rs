//! Change broadcaster - fans envelopes out to every registered observer.
//!
//! Delivery works on a snapshot of the registry taken when a broadcast
//! starts, so observers registering or leaving mid-broadcast never cause a
//! skipped or duplicated send. Each send is bounded by a timeout and a
//! failing observer is logged and skipped.
//!
//! Ordering: a [`DeliveryTicket`] fixes an envelope's place in the global
//! delivery sequence. Callers take the ticket while they still hold whatever
//! serializes the change (a point's slot lock), release that lock, and then
//! deliver. Fan-outs run strictly in ticket order, so every observer sees
//! envelopes in generation order without a slow observer holding up the
//! writers behind it.
//!
//! Cleanup ownership: the broadcaster never unregisters an observer on its
//! own, not even after a failed send. Removal belongs to the transport that
//! registered the channel; it calls [`ChangeBroadcaster::unregister`] when it
//! sees the disconnect. A failed send therefore only costs that observer one
//! envelope.

use crate::domain::envelope::ChangeEnvelope;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum ObserverSendError {
    #[error("observer channel closed")]
    Closed,
    #[error("observer queue full")]
    Overflow,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

/// One connected listener. `send` receives the already-encoded JSON envelope.
#[async_trait]
pub trait ObserverChannel: Send + Sync {
    async fn send(&self, payload: &str) -> Result<(), ObserverSendError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// A reserved position in the delivery sequence.
///
/// Dropping a ticket without delivering (an error path, a cancelled task)
/// gives its turn up so later tickets are not blocked.
#[must_use = "a ticket holds up every later broadcast until it is delivered or dropped"]
pub struct DeliveryTicket<'a> {
    broadcaster: &'a ChangeBroadcaster,
    seq: u64,
}

impl DeliveryTicket<'_> {
    /// Wait for every earlier ticket, then fan `envelope` out.
    pub async fn deliver(self, envelope: &ChangeEnvelope) -> BroadcastReport {
        self.broadcaster.wait_for_turn(self.seq).await;
        self.broadcaster.fan_out(envelope).await
    }
}

impl Drop for DeliveryTicket<'_> {
    fn drop(&mut self) {
        self.broadcaster.finish(self.seq);
    }
}

pub struct ChangeBroadcaster {
    observers: RwLock<HashMap<ObserverId, Arc<dyn ObserverChannel>>>,
    next_ticket: AtomicU64,
    // Sequence number of the ticket allowed to fan out.
    turn: watch::Sender<u64>,
    // Tickets given up before their turn came.
    abandoned: std::sync::Mutex<BTreeSet<u64>>,
    send_timeout: Duration,
}

impl ChangeBroadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        let (turn, _) = watch::channel(0);
        Self {
            observers: RwLock::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            turn,
            abandoned: std::sync::Mutex::new(BTreeSet::new()),
            send_timeout,
        }
    }

    pub async fn register(&self, channel: Arc<dyn ObserverChannel>) -> ObserverId {
        let id = ObserverId::new();
        let count = {
            let mut observers = self.observers.write().await;
            observers.insert(id, channel);
            observers.len()
        };
        tracing::info!(observer = %id, observers = count, "Observer registered");
        id
    }

    pub async fn unregister(&self, id: ObserverId) -> bool {
        let (removed, count) = {
            let mut observers = self.observers.write().await;
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            tracing::info!(observer = %id, observers = count, "Observer unregistered");
        }
        removed
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Reserve the next position in the delivery sequence. Never blocks.
    pub fn ticket(&self) -> DeliveryTicket<'_> {
        DeliveryTicket {
            broadcaster: self,
            seq: self.next_ticket.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Deliver `envelope` after everything already ticketed.
    /// Never fails; per-observer problems are logged and counted.
    pub async fn broadcast(&self, envelope: &ChangeEnvelope) -> BroadcastReport {
        self.ticket().deliver(envelope).await
    }

    async fn wait_for_turn(&self, seq: u64) {
        let mut turn = self.turn.subscribe();
        loop {
            let current = *turn.borrow_and_update();
            if current == seq {
                return;
            }
            // The sender lives in `self`, so this only fails during teardown.
            if turn.changed().await.is_err() {
                return;
            }
        }
    }

    fn finish(&self, seq: u64) {
        let mut abandoned = self.abandoned.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.turn.send_modify(|turn| {
            if *turn == seq {
                *turn += 1;
                while abandoned.remove(turn) {
                    *turn += 1;
                }
            } else {
                abandoned.insert(seq);
            }
        });
    }

    async fn fan_out(&self, envelope: &ChangeEnvelope) -> BroadcastReport {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(action = envelope.action(), "Failed to encode envelope: {}", e);
                return BroadcastReport::default();
            }
        };

        let snapshot: Vec<(ObserverId, Arc<dyn ObserverChannel>)> = {
            let observers = self.observers.read().await;
            observers.iter().map(|(id, channel)| (*id, channel.clone())).collect()
        };

        if snapshot.is_empty() {
            return BroadcastReport::default();
        }

        let sends = snapshot.iter().map(|(id, channel)| {
            let payload = payload.as_str();
            async move {
                let result = match tokio::time::timeout(self.send_timeout, channel.send(payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(ObserverSendError::Timeout(self.send_timeout)),
                };
                (*id, result)
            }
        });

        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            ..BroadcastReport::default()
        };
        for (id, result) in futures::future::join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(observer = %id, action = envelope.action(), "Broadcast send failed: {}", e);
                }
            }
        }

        tracing::debug!(
            action = envelope.action(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
