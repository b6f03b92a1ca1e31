// Domain layer - control points, status rules and wire models
pub mod envelope;
pub mod group;
pub mod history;
pub mod point;
pub mod settings;
pub mod status;
pub mod timestamp;
