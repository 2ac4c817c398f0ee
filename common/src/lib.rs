// Common library for the file-sync agent: discovery, submission and watermark tracking

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod models;
pub mod sync;
pub mod telemetry;
pub mod watermark;
pub mod workflow;
