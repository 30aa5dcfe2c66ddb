pub mod analyze;
pub mod commands;
pub mod config;
pub mod k8s;
pub mod telemetry;
