// Integration tests for complete sync cycles
// Real HTTP backend client and file watermark against mock servers.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::backend::{BackendClientConfig, HttpWorkflowBackend, VaultFile};
use common::config::SourceConfig;
use common::discovery::{DiscoverySource, S3DiscoverySource};
use common::errors::{CandidateError, CycleError, DiscoveryError};
use common::models::{Candidate, CandidateOutcome, DatasetId};
use common::sync::{SyncConfig, SyncOrchestrator};
use common::watermark::{format_watermark, FileWatermarkStore};
use common::workflow::WorkflowRegistry;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn dataset(secs: i64, name: &str) -> Candidate {
    Candidate::new(
        at(secs),
        DatasetId::new(name),
        json!({"dataset_name": name, "file_names": [format!("{}.tif", name)]}),
    )
}

/// Source returning a fixed set of datasets, filtered by the watermark
struct FixedSource(Result<Vec<Candidate>, String>);

#[async_trait]
impl DiscoverySource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn discover(
        &self,
        watermark: Option<DateTime<Utc>>,
        _config: &SourceConfig,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        match &self.0 {
            Ok(candidates) => Ok(candidates
                .iter()
                .filter(|c| watermark.map_or(true, |w| c.observed_at > w))
                .cloned()
                .collect()),
            Err(reason) => Err(DiscoveryError::SourceUnavailable(reason.clone())),
        }
    }
}

struct Harness {
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("vault"),
            "# backend service account\nUSERNAME: agent\nPASSWORD: s3cret\n",
        )
        .unwrap();
        Self { server, dir }
    }

    fn watermark_path(&self) -> std::path::PathBuf {
        self.dir.path().join("state").join("watermark")
    }

    fn orchestrator(
        &self,
        source: Arc<dyn DiscoverySource>,
        source_config: SourceConfig,
    ) -> SyncOrchestrator {
        let backend = HttpWorkflowBackend::new(
            &BackendClientConfig {
                base_url: format!("{}/", self.server.uri()),
                request_timeout_seconds: 5,
                verify_tls: true,
            },
            VaultFile::new(self.dir.path().join("vault")),
        )
        .unwrap();

        SyncOrchestrator::new(
            SyncConfig::default(),
            source,
            source_config,
            Arc::new(backend),
            Arc::new(FileWatermarkStore::new(self.watermark_path())),
            WorkflowRegistry::builtin(),
        )
    }

    async fn mount_token(&self) {
        Mock::given(method("POST"))
            .and(path("/api/token-auth/"))
            .and(body_partial_json(json!({"username": "agent", "password": "s3cret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok"})))
            .mount(&self.server)
            .await;
    }

    fn read_watermark_file(&self) -> Option<String> {
        std::fs::read_to_string(self.watermark_path()).ok()
    }
}

#[tokio::test]
async fn test_rejected_dataset_holds_watermark_at_last_success() {
    let harness = Harness::start().await;
    harness.mount_token().await;

    Mock::given(method("GET"))
        .and(path("/api/jobs/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/jobs/"))
        .and(body_partial_json(json!({"jobGroupId": "ds-A"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ids": [1, 2]})))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/jobs/"))
        .and(body_partial_json(json!({"jobGroupId": "ds-B"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid job config"))
        .expect(1)
        .mount(&harness.server)
        .await;

    let sync = harness.orchestrator(
        Arc::new(FixedSource(Ok(vec![dataset(200, "ds-B"), dataset(100, "ds-A")]))),
        SourceConfig::new(),
    );
    let report = sync.run_cycle().await.unwrap();

    assert_eq!(report.starting_watermark, None);
    assert_eq!(report.final_watermark, Some(at(100)));
    assert_eq!(report.created(), 1);
    assert_eq!(report.failed(), 1);
    assert!(matches!(
        &report.candidates[1].outcome,
        CandidateOutcome::Failed {
            error: CandidateError::Backend(_)
        }
    ));
    assert_eq!(
        harness.read_watermark_file().unwrap().trim_end(),
        format_watermark(at(100))
    );
    harness.server.verify().await;
}

#[tokio::test]
async fn test_lost_watermark_does_not_duplicate_workflows() {
    let harness = Harness::start().await;
    harness.mount_token().await;

    // First lookup per dataset finds nothing, afterwards the workflow exists
    for name in ["ds-A", "ds-B"] {
        Mock::given(method("GET"))
            .and(path("/api/jobs/"))
            .and(query_param("job_group_id", name))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&harness.server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/jobs/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/jobs/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ids": [7]})))
        .expect(2)
        .mount(&harness.server)
        .await;

    let sync = harness.orchestrator(
        Arc::new(FixedSource(Ok(vec![dataset(100, "ds-A"), dataset(200, "ds-B")]))),
        SourceConfig::new(),
    );

    let first = sync.run_cycle().await.unwrap();
    assert_eq!(first.created(), 2);
    assert_eq!(first.final_watermark, Some(at(200)));

    std::fs::remove_file(harness.watermark_path()).unwrap();

    let second = sync.run_cycle().await.unwrap();
    assert_eq!(second.starting_watermark, None);
    assert_eq!(second.created(), 0);
    assert_eq!(second.skipped(), 2);
    assert_eq!(
        harness.read_watermark_file().unwrap().trim_end(),
        format_watermark(at(200))
    );
    harness.server.verify().await;
}

#[tokio::test]
async fn test_discovery_failure_leaves_watermark_file_untouched() {
    let harness = Harness::start().await;
    harness.mount_token().await;
    Mock::given(path("/api/jobs/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;

    let original = b"2021-03-04 05:06:07+00:00\n";
    std::fs::create_dir_all(harness.watermark_path().parent().unwrap()).unwrap();
    std::fs::write(harness.watermark_path(), original).unwrap();

    let sync = harness.orchestrator(
        Arc::new(FixedSource(Err("listing timed out".to_string()))),
        SourceConfig::new(),
    );
    let err = sync.run_cycle().await.unwrap_err();

    assert!(matches!(err, CycleError::Discovery(_)));
    assert_eq!(std::fs::read(harness.watermark_path()).unwrap(), original);
    harness.server.verify().await;
}

#[tokio::test]
async fn test_auth_failure_aborts_before_any_side_effect() {
    let harness = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token-auth/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&harness.server)
        .await;
    Mock::given(path("/api/jobs/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.server)
        .await;

    let sync = harness.orchestrator(
        Arc::new(FixedSource(Ok(vec![dataset(100, "ds-A")]))),
        SourceConfig::new(),
    );
    let err = sync.run_cycle().await.unwrap_err();

    assert!(matches!(err, CycleError::Auth(_)));
    assert!(harness.read_watermark_file().is_none());
    harness.server.verify().await;
}

const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>imagery</Name>
  <Prefix>incoming/</Prefix>
  <KeyCount>5</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>incoming/flight-1/b.tif</Key>
    <LastModified>2024-05-01T10:00:00.000Z</LastModified>
    <ETag>"1"</ETag>
    <Size>10</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>incoming/flight-1/a.tif</Key>
    <LastModified>2024-05-01T10:00:00.000Z</LastModified>
    <ETag>"2"</ETag>
    <Size>10</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>incoming/flight-1/.READY_FOR_PROCESSING</Key>
    <LastModified>2024-05-01T10:05:00.000Z</LastModified>
    <ETag>"3"</ETag>
    <Size>0</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>incoming/flight-2/c.tif</Key>
    <LastModified>2024-05-01T11:00:00.000Z</LastModified>
    <ETag>"4"</ETag>
    <Size>10</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>incoming/readme.txt</Key>
    <LastModified>2024-05-01T09:00:00.000Z</LastModified>
    <ETag>"5"</ETag>
    <Size>10</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
</ListBucketResult>"#;

#[tokio::test]
async fn test_s3_source_submits_ready_dataset() {
    let harness = Harness::start().await;
    let storage = MockServer::start().await;
    harness.mount_token().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(LISTING),
        )
        .mount(&storage)
        .await;

    let expected_id = DatasetId::from_dataset_name("flight-1");
    Mock::given(method("GET"))
        .and(path("/api/jobs/"))
        .and(query_param("job_group_id", expected_id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/jobs/"))
        .and(body_partial_json(json!({
            "workflow": "geotiff_image_processing",
            "jobGroupId": expected_id.as_str(),
            "displayInfo": {"title": "flight-1", "tiff_file_count": 2},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ids": [42]})))
        .expect(1)
        .mount(&harness.server)
        .await;

    let source_config = SourceConfig::from([
        ("search_base".to_string(), "s3://imagery/incoming".to_string()),
        ("endpoint".to_string(), storage.uri()),
        ("access_key".to_string(), "minio".to_string()),
        ("secret_key".to_string(), "minio-secret".to_string()),
    ]);
    let sync = harness.orchestrator(Arc::new(S3DiscoverySource::new()), source_config);
    let report = sync.run_cycle().await.unwrap();

    let marker_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap();
    assert_eq!(report.created(), 1);
    assert_eq!(report.final_watermark, Some(marker_at));
    assert_eq!(
        harness.read_watermark_file().unwrap().trim_end(),
        format_watermark(marker_at)
    );
    harness.server.verify().await;
}
