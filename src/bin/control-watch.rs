// Observer process - mirrors the live point set and renders cards to the log
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use control_viewer::application::reconciler::{
    CardRenderer, ClientReconciler, EnvelopeOutcome, RefreshOutcome,
};
use control_viewer::domain::point::Point;
use control_viewer::infrastructure::config::{load_config, WatchConfig};
use control_viewer::infrastructure::snapshot_client::{subscribe, HttpSnapshotSource};

/// One card per point, drawn as a log line.
#[derive(Default)]
struct LogRenderer;

fn describe(point: &Point) -> String {
    let value = point
        .value
        .map_or_else(|| "N/A".to_string(), |value| value.to_string());
    let unit = point.unit.as_deref().unwrap_or("");
    format!("{} ({}): {}{} [{}]", point.name, point.id, value, unit, point.status)
}

impl CardRenderer for LogRenderer {
    type Card = String;

    fn create_card(&mut self, point: &Point) -> String {
        tracing::info!("+ {}", describe(point));
        point.id.clone()
    }

    fn destroy_card(&mut self, card: String) {
        tracing::info!("- {}", card);
    }

    fn replace_card(&mut self, _card: String, point: &Point) -> String {
        tracing::info!("~ {}", describe(point));
        point.id.clone()
    }

    fn show_error(&mut self, message: &str) {
        tracing::error!("{} (retrying)", message);
    }

    fn clear_error(&mut self) {
        tracing::info!("Connection restored");
    }

    fn show_empty(&mut self) {
        tracing::info!("No control points available");
    }
}

fn log_refresh(outcome: &RefreshOutcome) {
    if let RefreshOutcome::Applied(report) = outcome {
        tracing::debug!(
            created = report.created.len(),
            changed = report.changed.len(),
            removed = report.removed.len(),
            unchanged = report.unchanged,
            "Snapshot applied"
        );
    }
}

/// Runs until the process is interrupted.
async fn watch(config: WatchConfig) {
    let source = HttpSnapshotSource::new(&config.server_url);
    let ws_url = config.ws_url();
    let mut reconciler = ClientReconciler::new(LogRenderer, config.refresh_cooldown());

    loop {
        let delay = match subscribe(&ws_url).await {
            Ok(feed) => {
                futures::pin_mut!(feed);
                let outcome = reconciler.retry(&source).await;
                log_refresh(&outcome);

                while let Some(item) = feed.next().await {
                    match item {
                        Ok(envelope) => {
                            if reconciler.apply_envelope(&envelope) == EnvelopeOutcome::RefreshRequested {
                                log_refresh(&reconciler.refresh(&source).await);
                            }
                        }
                        Err(e) => {
                            reconciler.fail(format!("Connection lost: {e}"));
                            break;
                        }
                    }
                }
                config.reconnect_delay()
            }
            Err(e) => {
                reconciler.fail(format!("Cannot reach {}: {e}", config.server_url));
                config.connect_retry_delay()
            }
        };
        tokio::time::sleep(delay.max(Duration::from_secs(1))).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config().context("Failed to load configuration")?;
    tracing::info!(server = %config.watch.server_url, "Starting control-watch");

    tokio::select! {
        _ = watch(config.watch) => {}
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
    }

    tracing::info!("control-watch stopped");
    Ok(())
}
