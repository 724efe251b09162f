// Common library for the saved-search scheduling and notification engine

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod notifier;
pub mod provider;
pub mod queue;
pub mod reporter;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod worker;
