// Workflow-type specific job configuration builders

pub mod geotiff;

use crate::errors::WorkflowError;
use crate::models::{DatasetDetails, DisplayInfo, JobConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use geotiff::GeotiffImageProcessing;

/// Builds the backend payloads for one workflow type
pub trait WorkflowConfigBuilder: Send + Sync {
    fn build_job_config(&self, details: &DatasetDetails) -> Result<JobConfig, WorkflowError>;

    fn build_display_info(&self, details: &DatasetDetails) -> Result<DisplayInfo, WorkflowError>;
}

/// Registry of workflow builders keyed by workflow-type name
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    builders: BTreeMap<String, Arc<dyn WorkflowConfigBuilder>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every workflow type shipped with this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(geotiff::WORKFLOW_TYPE, Arc::new(GeotiffImageProcessing));
        registry
    }

    pub fn register(
        &mut self,
        workflow_type: impl Into<String>,
        builder: Arc<dyn WorkflowConfigBuilder>,
    ) {
        self.builders.insert(workflow_type.into(), builder);
    }

    pub fn contains(&self, workflow_type: &str) -> bool {
        self.builders.contains_key(workflow_type)
    }

    pub fn get(&self, workflow_type: &str) -> Result<Arc<dyn WorkflowConfigBuilder>, WorkflowError> {
        self.builders
            .get(workflow_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnsupportedWorkflowType(workflow_type.to_string()))
    }
}
