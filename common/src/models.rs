use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::CandidateError;

/// Opaque per-dataset payload handed through to workflow builders
pub type DatasetDetails = serde_json::Value;

/// Job configuration map sent to the backend on workflow creation
pub type JobConfig = serde_json::Value;

/// Display information sent to the backend on workflow creation
pub type DisplayInfo = serde_json::Value;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier of a dataset, used as the backend's job group id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Number of hex characters kept from the digest
    pub const WIDTH: usize = 16;

    /// Derive the id from a dataset's logical name.
    ///
    /// A fresh digest is computed per call, so the same name always yields
    /// the same id regardless of which other datasets were seen before it.
    pub fn from_dataset_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(Self::WIDTH);
        Self(id)
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-run label attached to every workflow created in that run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Fractional epoch seconds of `now`, e.g. `1614835567.123456`
    pub fn from_time(now: DateTime<Utc>) -> Self {
        Self(format!(
            "{}.{:06}",
            now.timestamp(),
            now.timestamp_subsec_micros()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a backend job created for a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Discovery Models
// ============================================================================

/// A discovered dataset pending submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Modification time of the dataset's readiness marker
    pub observed_at: DateTime<Utc>,
    pub dataset_id: DatasetId,
    pub details: DatasetDetails,
}

impl Candidate {
    pub fn new(observed_at: DateTime<Utc>, dataset_id: DatasetId, details: DatasetDetails) -> Self {
        Self {
            observed_at,
            dataset_id,
            details,
        }
    }
}

/// Everything the backend needs to create one workflow
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub workflow: String,
    pub job_group_id: DatasetId,
    pub batch_id: BatchId,
    pub job_config: JobConfig,
    pub display_info: DisplayInfo,
}

// ============================================================================
// Cycle Models
// ============================================================================

/// What happened to a single candidate during a cycle
#[derive(Debug)]
pub enum CandidateOutcome {
    Created { job_ids: Vec<JobId> },
    AlreadyExists,
    Failed { error: CandidateError },
}

impl CandidateOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CandidateOutcome::Failed { .. })
    }
}

/// Outcome of one candidate, in processing order
#[derive(Debug)]
pub struct CandidateReport {
    pub dataset_id: DatasetId,
    pub observed_at: DateTime<Utc>,
    pub outcome: CandidateOutcome,
}

/// Summary of a completed sync cycle
#[derive(Debug)]
pub struct CycleReport {
    pub batch_id: BatchId,
    pub starting_watermark: Option<DateTime<Utc>>,
    pub final_watermark: Option<DateTime<Utc>>,
    pub candidates: Vec<CandidateReport>,
}

impl CycleReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, CandidateOutcome::Created { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CandidateOutcome::AlreadyExists))
    }

    pub fn failed(&self) -> usize {
        self.count(CandidateOutcome::is_failure)
    }

    pub fn watermark_advanced(&self) -> bool {
        self.final_watermark != self.starting_watermark
    }

    fn count(&self, pred: impl Fn(&CandidateOutcome) -> bool) -> usize {
        self.candidates.iter().filter(|c| pred(&c.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendError;
    use chrono::TimeZone;

    #[test]
    fn test_dataset_id_is_deterministic() {
        let a = DatasetId::from_dataset_name("flight-2021-03-04");
        let b = DatasetId::from_dataset_name("flight-2021-03-04");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), DatasetId::WIDTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_dataset_id_differs_per_name() {
        let a = DatasetId::from_dataset_name("dataset-a");
        let b = DatasetId::from_dataset_name("dataset-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_batch_id_format() {
        let now = Utc.timestamp_opt(1_614_835_567, 123_456_000).unwrap();
        assert_eq!(BatchId::from_time(now).as_str(), "1614835567.123456");
    }

    #[test]
    fn test_workflow_request_wire_names() {
        let request = WorkflowRequest {
            workflow: "geotiff_image_processing".to_string(),
            job_group_id: DatasetId::new("abc"),
            batch_id: BatchId::from_time(Utc.timestamp_opt(1, 0).unwrap()),
            job_config: serde_json::json!({}),
            display_info: serde_json::json!({}),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jobGroupId"], "abc");
        assert_eq!(json["batchId"], "1.000000");
        assert!(json.get("jobConfig").is_some());
        assert!(json.get("displayInfo").is_some());
    }

    #[test]
    fn test_cycle_report_counts() {
        let t = Utc.timestamp_opt(100, 0).unwrap();
        let report = CycleReport {
            batch_id: BatchId::from_time(t),
            starting_watermark: None,
            final_watermark: Some(t),
            candidates: vec![
                CandidateReport {
                    dataset_id: DatasetId::new("a"),
                    observed_at: t,
                    outcome: CandidateOutcome::Created {
                        job_ids: vec![JobId("1".to_string())],
                    },
                },
                CandidateReport {
                    dataset_id: DatasetId::new("b"),
                    observed_at: t,
                    outcome: CandidateOutcome::AlreadyExists,
                },
                CandidateReport {
                    dataset_id: DatasetId::new("c"),
                    observed_at: t,
                    outcome: CandidateOutcome::Failed {
                        error: BackendError::Unavailable("down".to_string()).into(),
                    },
                },
            ],
        };
        assert_eq!(report.created(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.watermark_advanced());
    }
}
