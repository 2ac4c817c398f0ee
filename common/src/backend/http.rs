// HTTP workflow backend client

use super::credentials::VaultFile;
use super::{AuthToken, WorkflowBackend};
use crate::errors::BackendError;
use crate::models::{DatasetId, JobId, WorkflowRequest};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Connection settings for the backend HTTP API
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub verify_tls: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    ids: Vec<Value>,
}

/// Backend reached over its REST API with token authentication
pub struct HttpWorkflowBackend {
    client: Client,
    base_url: String,
    vault: VaultFile,
}

impl HttpWorkflowBackend {
    pub fn new(config: &BackendClientConfig, vault: VaultFile) -> Result<Self, BackendError> {
        if !config.verify_tls {
            warn!(base_url = %config.base_url, "TLS certificate verification disabled for backend");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                BackendError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vault,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_token(request: RequestBuilder, token: &AuthToken) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Token {}", token.expose()),
        )
    }
}

/// Map a non-success response to the backend error taxonomy.
/// Auth and server-side statuses are transient; other client errors are rejections.
async fn classify_failure(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    status_error(status, body)
}

fn status_error(status: StatusCode, body: String) -> BackendError {
    if status.is_server_error()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        BackendError::Unavailable(format!("({}) {}", status.as_u16(), body))
    } else {
        BackendError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn job_id(value: &Value) -> JobId {
    match value {
        Value::String(s) => JobId(s.clone()),
        other => JobId(other.to_string()),
    }
}

#[async_trait]
impl WorkflowBackend for HttpWorkflowBackend {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn authenticate(&self) -> Result<AuthToken, BackendError> {
        let credentials = self.vault.load().await?;

        let response = self
            .client
            .post(self.url("/api/token-auth/"))
            .json(&json!({
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Token request failed");
                BackendError::AuthFailure(format!("Token request failed: {}", e))
            })?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::AuthFailure(format!(
                "({}) {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            BackendError::AuthFailure(format!("Failed to parse token response: {}", e))
        })?;

        debug!("Obtained backend token");
        Ok(AuthToken::new(token.token))
    }

    #[instrument(skip(self, token), fields(dataset_id = %dataset_id))]
    async fn exists(
        &self,
        token: &AuthToken,
        dataset_id: &DatasetId,
    ) -> Result<bool, BackendError> {
        let request = self
            .client
            .get(self.url("/api/jobs/"))
            .query(&[("job_group_id", dataset_id.as_str())]);

        let response = Self::with_token(request, token).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(classify_failure(response).await),
        }
    }

    #[instrument(skip(self, token, request), fields(dataset_id = %request.job_group_id, batch_id = %request.batch_id))]
    async fn create(
        &self,
        token: &AuthToken,
        request: &WorkflowRequest,
    ) -> Result<Vec<JobId>, BackendError> {
        let http_request = self.client.post(self.url("/api/jobs/")).json(request);
        let response = Self::with_token(http_request, token).send().await?;

        if response.status() != StatusCode::CREATED {
            return Err(classify_failure(response).await);
        }

        let created: CreateResponse = response.json().await.map_err(|e| {
            BackendError::InvalidResponse(format!("Failed to parse creation response: {}", e))
        })?;

        Ok(created.ids.iter().map(job_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_unavailable() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream".to_string());
        assert!(matches!(err, BackendError::Unavailable(_)));
        let err = status_error(StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[test]
    fn test_client_errors_are_rejections() {
        let err = status_error(StatusCode::BAD_REQUEST, "bad config".to_string());
        assert!(matches!(
            err,
            BackendError::Rejected { status: 400, ref message } if message == "bad config"
        ));
    }

    #[test]
    fn test_job_ids_accept_numbers_and_strings() {
        assert_eq!(job_id(&json!(42)), JobId("42".to_string()));
        assert_eq!(job_id(&json!("job-7")), JobId("job-7".to_string()));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = BackendClientConfig {
            base_url: "https://backend.example.com/".to_string(),
            request_timeout_seconds: 5,
            verify_tls: true,
        };
        let backend = HttpWorkflowBackend::new(&config, VaultFile::new("/dev/null")).unwrap();
        assert_eq!(
            backend.url("/api/jobs/"),
            "https://backend.example.com/api/jobs/"
        );
    }
}
