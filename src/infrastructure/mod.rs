// Infrastructure layer - adapters for config, storage, start-up data and transports
pub mod bootstrap;
pub mod config;
pub mod memory_history;
pub mod snapshot_client;
pub mod ws_channel;
