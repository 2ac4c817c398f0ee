// Error handling framework
// Cycle-level errors abort a sync cycle; candidate-level errors are recovered in the loop.

use thiserror::Error;

/// Discovery source errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid discovery source configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown file source '{0}'")]
    UnknownSource(String),
}

/// Workflow backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::AuthFailure(_) => "auth_failure",
            BackendError::Unavailable(_) => "backend_unavailable",
            BackendError::Rejected { .. } => "backend_rejected",
            BackendError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Watermark persistence errors
#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("Corrupt watermark in '{path}': {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Watermark I/O failed for '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// Workflow configuration builder errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow type '{0}' not supported")]
    UnsupportedWorkflowType(String),

    #[error("Invalid dataset details: {0}")]
    InvalidDetails(String),
}

/// Failure of a single candidate within a cycle.
/// Never aborts the cycle, only blocks further watermark advancement.
#[derive(Error, Debug)]
pub enum CandidateError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl CandidateError {
    pub fn kind(&self) -> &'static str {
        match self {
            CandidateError::Backend(e) => e.kind(),
            CandidateError::Workflow(WorkflowError::UnsupportedWorkflowType(_)) => {
                "unsupported_workflow_type"
            }
            CandidateError::Workflow(WorkflowError::InvalidDetails(_)) => "invalid_details",
        }
    }
}

/// Failure that aborts a whole sync cycle
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Cycle aborted during authentication: {0}")]
    Auth(BackendError),

    #[error("Cycle aborted during discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Cycle aborted on watermark: {0}")]
    Watermark(#[from] WatermarkError),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Auth(_) => "auth_failure",
            CycleError::Discovery(_) => "source_unavailable",
            CycleError::Watermark(WatermarkError::Corrupt { .. }) => "corrupt_watermark",
            CycleError::Watermark(WatermarkError::Io { .. }) => "watermark_io",
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Unavailable(err.to_string())
    }
}

impl From<s3::error::S3Error> for DiscoveryError {
    fn from(err: s3::error::S3Error) -> Self {
        DiscoveryError::SourceUnavailable(err.to_string())
    }
}
