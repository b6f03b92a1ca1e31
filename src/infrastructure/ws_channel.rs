// Queue-backed observer channel for WebSocket connections
use crate::application::broadcaster::{ObserverChannel, ObserverSendError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Broadcaster side of a connection. Frames go into a bounded queue drained
/// by the connection's writer task. `send` never waits: a full queue means
/// the client stopped reading, so the frame is refused and the overflow
/// signal fires for the connection to close itself.
pub struct QueuedObserver {
    tx: mpsc::Sender<String>,
    overflow: CancellationToken,
}

pub fn queued_observer(capacity: usize) -> (QueuedObserver, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let observer = QueuedObserver {
        tx,
        overflow: CancellationToken::new(),
    };
    (observer, rx)
}

impl QueuedObserver {
    /// Resolves once a frame has been refused because the queue was full.
    pub fn overflowed(&self) -> WaitForCancellationFuture<'_> {
        self.overflow.cancelled()
    }
}

#[async_trait]
impl ObserverChannel for QueuedObserver {
    async fn send(&self, payload: &str) -> Result<(), ObserverSendError> {
        match self.tx.try_send(payload.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.overflow.cancel();
                Err(ObserverSendError::Overflow)
            }
            Err(TrySendError::Closed(_)) => Err(ObserverSendError::Closed),
        }
    }
}
