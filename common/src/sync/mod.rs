// Sync module: one discovery-to-submission cycle, and a runner repeating it

pub mod orchestrator;
pub mod runner;

pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use runner::SyncRunner;
