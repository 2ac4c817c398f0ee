// Bootstrap utilities for the agent binary
// Wires settings into an orchestrator with the selected discovery source.

use crate::backend::{BackendClientConfig, HttpWorkflowBackend, VaultFile, WorkflowBackend};
use crate::config::Settings;
use crate::discovery::SourceRegistry;
use crate::sync::{SyncConfig, SyncOrchestrator};
use crate::watermark::{FileWatermarkStore, WatermarkStore};
use crate::workflow::WorkflowRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Initialize the HTTP backend client
///
/// # Errors
/// Returns error if the HTTP client cannot be built
pub fn init_backend(settings: &Settings) -> Result<Arc<dyn WorkflowBackend>> {
    let config = BackendClientConfig {
        base_url: settings.agent.backend_url.clone(),
        request_timeout_seconds: settings.agent.request_timeout_seconds,
        verify_tls: settings.agent.verify_tls,
    };
    let backend = HttpWorkflowBackend::new(&config, VaultFile::new(&settings.agent.vault_file))
        .context("Failed to initialize backend client")?;

    info!(backend_url = %settings.agent.backend_url, "Backend client initialized");
    Ok(Arc::new(backend))
}

/// Build an orchestrator for `file_source` from the built-in registries
///
/// # Errors
/// Returns error if the file source is unknown or the backend client fails to build
pub fn init_orchestrator(settings: &Settings, file_source: &str) -> Result<SyncOrchestrator> {
    let sources = SourceRegistry::builtin();
    let source = sources.create(file_source).with_context(|| {
        format!(
            "No file-sync plugin for '{}' (available: {})",
            file_source,
            sources.names().collect::<Vec<_>>().join(", ")
        )
    })?;
    info!(file_source = %file_source, "Loaded file-sync plugin");

    let workflows = WorkflowRegistry::builtin();
    if !workflows.contains(&settings.agent.workflow) {
        // Still per-candidate: every new dataset will fail and hold the watermark
        warn!(workflow = %settings.agent.workflow, "Configured workflow type is not supported");
    }

    let watermark: Arc<dyn WatermarkStore> =
        Arc::new(FileWatermarkStore::new(&settings.agent.watermark_file));

    Ok(SyncOrchestrator::new(
        SyncConfig {
            workflow_type: settings.agent.workflow.clone(),
            on_corrupt_watermark: settings.agent.on_corrupt_watermark,
        },
        source,
        settings.source.clone(),
        init_backend(settings)?,
        watermark,
        workflows,
    ))
}
