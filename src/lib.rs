pub mod config;
pub mod crds;
pub mod error;
pub mod reconciler;
pub mod resources;
pub mod store;
pub mod telemetry;
