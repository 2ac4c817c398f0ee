// Discovery sources enumerate ready datasets newer than the watermark

pub mod grouping;
pub mod s3;

use crate::config::SourceConfig;
use crate::errors::DiscoveryError;
use crate::models::Candidate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use grouping::{group_listing, ListedObject, READINESS_MARKER_SUFFIX};
pub use s3::S3DiscoverySource;

/// A pluggable source of dataset candidates.
///
/// Implementations must only return datasets carrying a readiness marker,
/// stamp each candidate with that marker's modification time, drop datasets
/// whose marker is not strictly newer than `watermark`, and group raw entries
/// so that each dataset appears exactly once.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Registry key of this source
    fn name(&self) -> &str;

    /// Discover ready datasets. `None` means no watermark, i.e. scan everything.
    async fn discover(
        &self,
        watermark: Option<DateTime<Utc>>,
        config: &SourceConfig,
    ) -> Result<Vec<Candidate>, DiscoveryError>;
}

/// Constructor stored in the registry
pub type SourceFactory = fn() -> Arc<dyn DiscoverySource>;

/// Compile-time registry of discovery sources keyed by name
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every source shipped with this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(s3::SOURCE_NAME, || Arc::new(S3DiscoverySource::new()));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: SourceFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the source registered under `name`
    pub fn create(&self, name: &str) -> Result<Arc<dyn DiscoverySource>, DiscoveryError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DiscoveryError::UnknownSource(name.to_string()))
    }
}
