// Sync orchestrator
// Drives a single cycle: authenticate, read watermark, discover, submit in
// timestamp order, and advance the watermark over the successful prefix.

use crate::backend::{AuthToken, WorkflowBackend};
use crate::config::{CorruptWatermarkPolicy, SourceConfig};
use crate::discovery::DiscoverySource;
use crate::errors::{CandidateError, CycleError, WatermarkError};
use crate::models::{
    BatchId, Candidate, CandidateOutcome, CandidateReport, CycleReport, WorkflowRequest,
};
use crate::telemetry;
use crate::watermark::{format_watermark, WatermarkStore};
use crate::workflow::WorkflowRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Per-deployment orchestrator settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Workflow type created for every discovered dataset
    pub workflow_type: String,
    pub on_corrupt_watermark: CorruptWatermarkPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workflow_type: crate::workflow::geotiff::WORKFLOW_TYPE.to_string(),
            on_corrupt_watermark: CorruptWatermarkPolicy::Abort,
        }
    }
}

/// Orchestrates discovery and idempotent workflow submission.
///
/// Callers must not run two cycles against the same watermark concurrently.
pub struct SyncOrchestrator {
    config: SyncConfig,
    source: Arc<dyn DiscoverySource>,
    source_config: SourceConfig,
    backend: Arc<dyn WorkflowBackend>,
    watermark: Arc<dyn WatermarkStore>,
    workflows: WorkflowRegistry,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn DiscoverySource>,
        source_config: SourceConfig,
        backend: Arc<dyn WorkflowBackend>,
        watermark: Arc<dyn WatermarkStore>,
        workflows: WorkflowRegistry,
    ) -> Self {
        Self {
            config,
            source,
            source_config,
            backend,
            watermark,
            workflows,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one full cycle.
    ///
    /// Only cycle-level failures (authentication, discovery, watermark) are
    /// returned as errors; per-candidate failures are part of the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let batch_id = BatchId::from_time(Utc::now());
        let span = info_span!(
            "sync_cycle",
            batch_id = %batch_id,
            source = self.source.name(),
            workflow = %self.config.workflow_type
        );

        let result = self.execute_cycle(batch_id).instrument(span).await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(report) => {
                let outcome = if report.failed() > 0 {
                    "partial"
                } else {
                    "completed"
                };
                telemetry::record_cycle(outcome, elapsed);
            }
            Err(e) => telemetry::record_cycle(e.kind(), elapsed),
        }

        result
    }

    async fn execute_cycle(&self, batch_id: BatchId) -> Result<CycleReport, CycleError> {
        info!("Starting sync cycle");

        let token = self.backend.authenticate().await.map_err(|e| {
            error!(error = %e, "Failed to get auth token from backend");
            CycleError::Auth(e)
        })?;

        let starting_watermark = self.read_watermark().await?;
        match starting_watermark {
            Some(ts) => info!(watermark = %format_watermark(ts), "Watermark loaded"),
            None => info!("No watermark found, scanning everything"),
        }

        let mut candidates = self
            .source
            .discover(starting_watermark, &self.source_config)
            .await
            .map_err(|e| {
                error!(error = %e, "Error while discovering new datasets");
                CycleError::from(e)
            })?;

        // Stable: equal timestamps keep discovery order
        candidates.sort_by_key(|c| c.observed_at);
        info!(count = candidates.len(), "Candidates discovered");

        let mut held = starting_watermark;
        let mut can_advance = true;
        let mut reports = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let outcome = match self.submit(&token, &batch_id, &candidate).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    error!(
                        dataset_id = %candidate.dataset_id,
                        observed_at = %format_watermark(candidate.observed_at),
                        reason = error.kind(),
                        error = %error,
                        "Failed to create workflow"
                    );
                    telemetry::record_candidate_failure(error.kind());
                    can_advance = false;
                    CandidateOutcome::Failed { error }
                }
            };

            if can_advance && held.map_or(true, |w| candidate.observed_at > w) {
                self.advance_watermark(candidate.observed_at).await?;
                held = Some(candidate.observed_at);
            }

            reports.push(CandidateReport {
                dataset_id: candidate.dataset_id,
                observed_at: candidate.observed_at,
                outcome,
            });
        }

        let report = CycleReport {
            batch_id,
            starting_watermark,
            final_watermark: held,
            candidates: reports,
        };

        info!(
            created = report.created(),
            skipped = report.skipped(),
            failed = report.failed(),
            watermark_advanced = report.watermark_advanced(),
            "Sync cycle finished"
        );
        Ok(report)
    }

    async fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, CycleError> {
        match self.watermark.read().await {
            Ok(watermark) => Ok(watermark),
            Err(e @ WatermarkError::Corrupt { .. })
                if self.config.on_corrupt_watermark == CorruptWatermarkPolicy::Rescan =>
            {
                warn!(error = %e, "Ignoring corrupt watermark, rescanning everything");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Failed to read watermark");
                Err(e.into())
            }
        }
    }

    async fn advance_watermark(&self, watermark: DateTime<Utc>) -> Result<(), CycleError> {
        self.watermark.write(watermark).await.map_err(|e| {
            error!(error = %e, "Failed to persist watermark, aborting cycle");
            CycleError::from(e)
        })?;
        telemetry::record_watermark(watermark);
        info!(watermark = %format_watermark(watermark), "Watermark advanced");
        Ok(())
    }

    /// Submit one candidate unless its workflow already exists
    async fn submit(
        &self,
        token: &AuthToken,
        batch_id: &BatchId,
        candidate: &Candidate,
    ) -> Result<CandidateOutcome, CandidateError> {
        if self.backend.exists(token, &candidate.dataset_id).await? {
            info!(dataset_id = %candidate.dataset_id, "Workflow already exists, skipping");
            telemetry::record_workflow_skipped();
            return Ok(CandidateOutcome::AlreadyExists);
        }

        let builder = self.workflows.get(&self.config.workflow_type)?;
        let request = WorkflowRequest {
            workflow: self.config.workflow_type.clone(),
            job_group_id: candidate.dataset_id.clone(),
            batch_id: batch_id.clone(),
            job_config: builder.build_job_config(&candidate.details)?,
            display_info: builder.build_display_info(&candidate.details)?,
        };

        info!(
            dataset_id = %candidate.dataset_id,
            observed_at = %format_watermark(candidate.observed_at),
            "Creating workflow"
        );
        let job_ids = self.backend.create(token, &request).await?;

        let ids: Vec<&str> = job_ids.iter().map(|id| id.0.as_str()).collect();
        info!(dataset_id = %candidate.dataset_id, job_ids = ?ids, "Created jobs");
        telemetry::record_workflow_created(&self.config.workflow_type);

        Ok(CandidateOutcome::Created { job_ids })
    }
}
