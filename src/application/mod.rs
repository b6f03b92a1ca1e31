// Application layer - use cases, seams and the observer-side mirror
pub mod broadcaster;
pub mod control_service;
pub mod error;
pub mod history_repository;
pub mod reconciler;
pub mod scheduler;
pub mod simulator;
