pub mod analysis;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod providers;
pub mod telemetry;
