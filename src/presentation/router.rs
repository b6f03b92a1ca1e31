//! Axum router construction.
//!
//! Routes:
//! - `GET /health`
//! - `GET|POST /api/control-points`, `GET|PUT|DELETE /api/control-points/:id`
//! - `PUT /api/control-points/:id/value`
//! - `GET|POST /api/control-groups`, `GET|PUT|DELETE /api/control-groups/:id`
//! - `GET /api/historical-data/:id?start_time&end_time`
//! - `GET|PUT /api/settings`, `POST /api/simulate`
//! - `GET /api/ws` for the live change feed

use crate::presentation::app_state::AppState;
use crate::presentation::{handlers, ws};
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/control-points", get(handlers::list_points).post(handlers::create_point))
        .route(
            "/control-points/:id",
            get(handlers::get_point)
                .put(handlers::update_point)
                .delete(handlers::delete_point),
        )
        .route("/control-points/:id/value", put(handlers::set_value))
        .route("/control-groups", get(handlers::list_groups).post(handlers::create_group))
        .route(
            "/control-groups/:id",
            get(handlers::get_group)
                .put(handlers::update_group)
                .delete(handlers::delete_group),
        )
        .route("/historical-data/:id", get(handlers::get_history))
        .route("/settings", get(handlers::get_settings).put(handlers::update_settings))
        .route("/simulate", post(handlers::simulate))
        .route("/ws", get(ws::ws_observer));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
