// Workflow backend client interface

pub mod credentials;
pub mod http;

use crate::errors::BackendError;
use crate::models::{DatasetId, JobId, WorkflowRequest};
use async_trait::async_trait;
use std::fmt;

pub use credentials::{Credentials, VaultFile};
pub use http::{BackendClientConfig, HttpWorkflowBackend};

/// Token obtained once per cycle and presented on every backend call
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Backend job system that owns workflows keyed by dataset id
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Obtain a token for the rest of the cycle
    async fn authenticate(&self) -> Result<AuthToken, BackendError>;

    /// Whether a workflow already exists for the dataset, in any state
    async fn exists(&self, token: &AuthToken, dataset_id: &DatasetId)
        -> Result<bool, BackendError>;

    /// Create the workflow and return the ids of its jobs
    async fn create(
        &self,
        token: &AuthToken,
        request: &WorkflowRequest,
    ) -> Result<Vec<JobId>, BackendError>;
}
