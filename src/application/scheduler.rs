//! Simulation scheduler - drives periodic sweeps.
//!
//! The loop alternates between two states. **Idle** waits for the next
//! deadline, using the tick period read from the settings at the start of
//! every wait, so a period change lands on the very next cycle. **Ticking**
//! runs one sweep to completion.
//!
//! A failed sweep (including a panic inside it) is logged and followed by a
//! short fixed retry delay; nothing but the shutdown token ends the loop.
//! Shutdown is only observed while idle, so an in-flight sweep always finishes.

use crate::application::control_service::ControlService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ticking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub sweeps: u64,
    pub failed_sweeps: u64,
}

pub struct SimulationScheduler {
    service: Arc<ControlService>,
    state: watch::Sender<SchedulerState>,
}

impl SimulationScheduler {
    pub fn new(service: Arc<ControlService>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self { service, state }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut last_failed = false;

        let refresh_rate = self.service.get_settings().await.refresh_rate;
        tracing::info!(refresh_rate, "Simulation scheduler started");

        loop {
            let delay = if last_failed {
                RETRY_DELAY
            } else {
                self.service.get_settings().await.tick_period()
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            self.state.send_replace(SchedulerState::Ticking);
            last_failed = !self.tick(&mut stats).await;
            self.state.send_replace(SchedulerState::Idle);
        }

        tracing::info!(
            sweeps = stats.sweeps,
            failed_sweeps = stats.failed_sweeps,
            "Simulation scheduler stopped"
        );
        stats
    }

    async fn tick(&self, stats: &mut SchedulerStats) -> bool {
        // Spawned so a panicking sweep surfaces as a JoinError, not a dead loop.
        let service = self.service.clone();
        let outcome = tokio::spawn(async move { service.simulate().await }).await;

        match outcome {
            Ok(Ok(summary)) => {
                stats.sweeps += 1;
                tracing::debug!(
                    advanced = summary.advanced,
                    failed = summary.failed,
                    observers = summary.delivery.attempted,
                    "Simulation tick"
                );
                true
            }
            Ok(Err(e)) => {
                stats.failed_sweeps += 1;
                tracing::error!("Simulation sweep failed, retrying in {:?}: {}", RETRY_DELAY, e);
                false
            }
            Err(e) => {
                stats.failed_sweeps += 1;
                tracing::error!("Simulation sweep aborted, retrying in {:?}: {}", RETRY_DELAY, e);
                false
            }
        }
    }
}
