// Main entry point - Dependency injection and server setup
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use control_viewer::application::broadcaster::ChangeBroadcaster;
use control_viewer::application::control_service::ControlService;
use control_viewer::application::scheduler::SimulationScheduler;
use control_viewer::application::simulator::{SeededRandom, ValueSimulator};
use control_viewer::infrastructure::bootstrap::{generate_sample_points, load_data_dir, seed_service, BootstrapData};
use control_viewer::infrastructure::config::load_config;
use control_viewer::infrastructure::memory_history::InMemoryHistory;
use control_viewer::presentation::app_state::AppState;
use control_viewer::presentation::router::build_router;

fn random_source(seed: Option<u64>) -> SeededRandom {
    match seed {
        Some(seed) => SeededRandom::from_seed(seed),
        None => SeededRandom::from_entropy(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config().context("Failed to load configuration")?;

    // Bootstrap data; a settings file overrides the [settings] table
    let mut data = match &config.bootstrap.data_dir {
        Some(dir) => load_data_dir(dir).await,
        None => BootstrapData::default(),
    };
    let settings = data.settings.take().unwrap_or_else(|| config.settings.clone());
    settings.validate().context("Invalid [settings] configuration")?;

    if config.bootstrap.sample_points > 0 {
        let mut random = random_source(config.simulation.seed.map(|seed| seed.wrapping_add(1)));
        data.points.extend(generate_sample_points(config.bootstrap.sample_points, &mut random));
    }

    // Create services (application layer)
    let history = Arc::new(InMemoryHistory::new(settings.max_history_records()));
    let broadcaster = Arc::new(ChangeBroadcaster::new(config.broadcast.send_timeout()));
    let simulator = ValueSimulator::new(Box::new(random_source(config.simulation.seed)));
    let service = Arc::new(ControlService::new(settings, history, broadcaster, simulator).await);
    seed_service(&service, data).await;

    // Background simulation
    let shutdown = CancellationToken::new();
    let scheduler = if config.simulation.enabled {
        Some(tokio::spawn(SimulationScheduler::new(service.clone()).run(shutdown.clone())))
    } else {
        tracing::info!("Simulation disabled");
        None
    };

    // Build router (presentation layer)
    let state = Arc::new(AppState::new(service, config.broadcast.observer_queue));
    let router = build_router(state);

    // Start server
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting control-viewer service");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    }
                }
                _ = server_shutdown.cancelled() => {}
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    shutdown.cancel();
    if let Some(scheduler) = scheduler {
        let stats = scheduler.await.context("Simulation scheduler panicked")?;
        tracing::info!(sweeps = stats.sweeps, failed_sweeps = stats.failed_sweeps, "Stopped");
    }

    Ok(())
}
