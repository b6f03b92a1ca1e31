// Presentation layer - axum routes, handlers and the observer WebSocket
pub mod app_state;
pub mod handlers;
pub mod http_response;
pub mod router;
pub mod ws;
