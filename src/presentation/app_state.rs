// Application state for HTTP and WebSocket handlers
use crate::application::control_service::ControlService;
use std::sync::Arc;

pub struct AppState {
    pub service: Arc<ControlService>,
    /// Outbound frames buffered per WebSocket observer.
    pub observer_queue: usize,
}

impl AppState {
    pub fn new(service: Arc<ControlService>, observer_queue: usize) -> Self {
        Self {
            service,
            observer_queue,
        }
    }
}
