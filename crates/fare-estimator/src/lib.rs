pub mod config;
pub mod error;
pub mod fares;
pub mod telemetry;
