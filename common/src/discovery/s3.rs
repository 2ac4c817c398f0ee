// S3 discovery source
// Lists every object under the configured search base and groups them into datasets.

use super::grouping::{group_listing, ListedObject, READINESS_MARKER_SUFFIX};
use super::DiscoverySource;
use crate::config::SourceConfig;
use crate::errors::DiscoveryError;
use crate::models::Candidate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use tracing::{debug, error, info, instrument, warn};

/// Registry key of this source
pub const SOURCE_NAME: &str = "s3";

const DEFAULT_REGION: &str = "us-east-1";

/// Bucket and key prefix parsed from an `s3://bucket/prefix` search base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchBase {
    pub bucket: String,
    /// Empty, or ends with `/`
    pub prefix: String,
}

impl SearchBase {
    pub fn parse(raw: &str) -> Result<Self, DiscoveryError> {
        let url = Url::parse(raw).map_err(|e| {
            DiscoveryError::InvalidConfiguration(format!("search_base '{}': {}", raw, e))
        })?;
        if url.scheme() != "s3" {
            return Err(DiscoveryError::InvalidConfiguration(format!(
                "search_base '{}' must use the s3:// scheme",
                raw
            )));
        }
        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                DiscoveryError::InvalidConfiguration(format!(
                    "search_base '{}' has no bucket",
                    raw
                ))
            })?
            .to_string();

        let path = url.path().trim_matches('/');
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        Ok(Self { bucket, prefix })
    }
}

/// Connection settings read from the source's configuration block
#[derive(Debug, Clone)]
struct S3Settings {
    search_base: SearchBase,
    region: String,
    endpoint: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl S3Settings {
    fn from_config(config: &SourceConfig) -> Result<Self, DiscoveryError> {
        let search_base = config.get("search_base").ok_or_else(|| {
            DiscoveryError::InvalidConfiguration("missing 'search_base' for s3 source".to_string())
        })?;

        let non_empty = |key: &str| {
            config
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            search_base: SearchBase::parse(search_base)?,
            region: non_empty("region").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: non_empty("endpoint"),
            access_key: non_empty("access_key"),
            secret_key: non_empty("secret_key"),
        })
    }

    fn bucket(&self) -> Result<Bucket, DiscoveryError> {
        let credentials = match (&self.access_key, &self.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(
                    Some(access_key.as_str()),
                    Some(secret_key.as_str()),
                    None,
                    None,
                    None,
                )
            }
            _ => Credentials::default(),
        }
        .map_err(|e| {
            error!(error = %e, "Failed to resolve S3 credentials");
            DiscoveryError::SourceUnavailable(format!("Failed to resolve credentials: {}", e))
        })?;

        let region = match &self.endpoint {
            Some(endpoint) => Region::Custom {
                region: self.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => self.region.parse::<Region>().map_err(|e| {
                DiscoveryError::InvalidConfiguration(format!(
                    "invalid region '{}': {}",
                    self.region, e
                ))
            })?,
        };

        let bucket = Bucket::new(&self.search_base.bucket, region, credentials).map_err(|e| {
            error!(error = %e, bucket = %self.search_base.bucket, "Failed to create S3 bucket handle");
            DiscoveryError::SourceUnavailable(format!("Failed to create bucket handle: {}", e))
        })?;

        // S3-compatible stores behind a custom endpoint rarely support virtual hosts
        Ok(if self.endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

/// Discovery source backed by an S3 bucket
#[derive(Debug, Default)]
pub struct S3DiscoverySource;

impl S3DiscoverySource {
    pub fn new() -> Self {
        Self
    }

    /// List every object under the prefix, keyed relative to it
    #[instrument(skip(bucket), fields(bucket = %bucket.name()))]
    async fn list_objects(
        bucket: &Bucket,
        prefix: &str,
    ) -> Result<Vec<ListedObject>, DiscoveryError> {
        let pages = bucket.list(prefix.to_string(), None).await.map_err(|e| {
            error!(error = %e, prefix = %prefix, "Failed to list objects");
            DiscoveryError::from(e)
        })?;

        let mut objects = Vec::new();
        for object in pages.into_iter().flat_map(|page| page.contents) {
            if let Some(listed) = listed_object(&object.key, &object.last_modified, prefix)? {
                objects.push(listed);
            }
        }

        debug!(count = objects.len(), "Objects listed");
        Ok(objects)
    }
}

/// Convert one listing entry, relative to `prefix`.
///
/// An unparseable modification time on a readiness marker fails the listing,
/// since skipping it would hide the dataset without a trace.
fn listed_object(
    key: &str,
    last_modified: &str,
    prefix: &str,
) -> Result<Option<ListedObject>, DiscoveryError> {
    let Some(relative) = key.strip_prefix(prefix) else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(last_modified) {
        Ok(ts) => Ok(Some(ListedObject::new(relative, ts.with_timezone(&Utc)))),
        Err(e) if relative.ends_with(READINESS_MARKER_SUFFIX) => {
            error!(key = %key, last_modified = %last_modified, error = %e,
                "Readiness marker has an unparseable modification time");
            Err(DiscoveryError::SourceUnavailable(format!(
                "invalid LastModified '{}' on '{}': {}",
                last_modified, key, e
            )))
        }
        Err(e) => {
            warn!(key = %key, last_modified = %last_modified, error = %e,
                "Skipping object with unparseable modification time");
            Ok(None)
        }
    }
}

#[async_trait]
impl DiscoverySource for S3DiscoverySource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self, config), fields(watermark = ?watermark))]
    async fn discover(
        &self,
        watermark: Option<DateTime<Utc>>,
        config: &SourceConfig,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        let settings = S3Settings::from_config(config)?;
        info!(
            bucket = %settings.search_base.bucket,
            prefix = %settings.search_base.prefix,
            "Scanning S3 search base"
        );

        let bucket = settings.bucket()?;
        let objects = Self::list_objects(&bucket, &settings.search_base.prefix).await?;
        let candidates = group_listing(objects, watermark);

        info!(count = candidates.len(), "Found new dataset(s)");
        Ok(candidates)
    }
}
