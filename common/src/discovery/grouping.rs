// Grouping of raw storage listings into dataset candidates

use crate::models::{Candidate, DatasetId};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Sentinel written last by uploaders once a dataset is complete
pub const READINESS_MARKER_SUFFIX: &str = ".READY_FOR_PROCESSING";

/// One object from a storage listing, keyed relative to the search base
#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl ListedObject {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

#[derive(Default)]
struct DatasetGroup {
    marker_at: Option<DateTime<Utc>>,
    file_names: Vec<String>,
}

/// Turn a flat listing into one candidate per ready dataset.
///
/// Objects are grouped by the first segment of their key. A group is only
/// emitted when it contains a readiness marker whose modification time is
/// strictly after `watermark`; the newest marker wins when there are several.
/// Top-level objects and directory placeholders belong to no dataset.
pub fn group_listing(
    objects: impl IntoIterator<Item = ListedObject>,
    watermark: Option<DateTime<Utc>>,
) -> Vec<Candidate> {
    let mut groups: BTreeMap<String, DatasetGroup> = BTreeMap::new();

    for object in objects {
        let key = object.key.trim_start_matches('/');
        let Some((dataset, rest)) = key.split_once('/') else {
            debug!(key = %object.key, "Ignoring object outside any dataset");
            continue;
        };
        if dataset.is_empty() || rest.is_empty() || rest.ends_with('/') {
            continue;
        }

        let group = groups.entry(dataset.to_string()).or_default();
        if rest.ends_with(READINESS_MARKER_SUFFIX) {
            group.marker_at = group.marker_at.max(Some(object.last_modified));
        } else {
            let file_name = rest.rsplit('/').next().unwrap_or(rest);
            group.file_names.push(file_name.to_string());
        }
    }

    groups
        .into_iter()
        .filter_map(|(dataset, mut group)| {
            let marker_at = match group.marker_at {
                Some(marker_at) => marker_at,
                None => {
                    debug!(dataset = %dataset, "Dataset has no readiness marker yet");
                    return None;
                }
            };
            if watermark.is_some_and(|watermark| marker_at <= watermark) {
                return None;
            }

            group.file_names.sort();
            let details = json!({
                "dataset_name": dataset,
                "file_names": group.file_names,
            });
            Some(Candidate::new(
                marker_at,
                DatasetId::from_dataset_name(&dataset),
                details,
            ))
        })
        .collect()
}
