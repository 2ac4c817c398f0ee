use super::WorkflowConfigBuilder;
use crate::errors::WorkflowError;
use crate::models::{DatasetDetails, DisplayInfo, JobConfig};
use serde_json::{json, Map, Value};

pub const WORKFLOW_TYPE: &str = "geotiff_image_processing";

const TILEGEN_JOB_TYPE: &str = "tilegen";
const PROCESSING_JOB_TYPE: &str = "processing";

/// Tile generation plus processing of a GeoTIFF dataset
#[derive(Debug, Default, Clone, Copy)]
pub struct GeotiffImageProcessing;

fn as_object(details: &DatasetDetails) -> Result<&Map<String, Value>, WorkflowError> {
    details.as_object().ok_or_else(|| {
        WorkflowError::InvalidDetails(format!("expected a JSON object, got {}", details))
    })
}

fn is_tiff(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tif") || lower.ends_with(".tiff")
}

/// `tiff_file_names` wins when present, otherwise TIFFs in `file_names`, otherwise -1
fn tiff_file_count(details: &Map<String, Value>) -> i64 {
    if let Some(names) = details.get("tiff_file_names").and_then(Value::as_array) {
        return names.len() as i64;
    }
    match details.get("file_names").and_then(Value::as_array) {
        Some(names) => names
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| is_tiff(name))
            .count() as i64,
        None => -1,
    }
}

impl WorkflowConfigBuilder for GeotiffImageProcessing {
    fn build_job_config(&self, details: &DatasetDetails) -> Result<JobConfig, WorkflowError> {
        as_object(details)?;
        Ok(json!({
            TILEGEN_JOB_TYPE: details,
            PROCESSING_JOB_TYPE: details,
        }))
    }

    fn build_display_info(&self, details: &DatasetDetails) -> Result<DisplayInfo, WorkflowError> {
        let object = as_object(details)?;
        let title = object
            .get("dataset_name")
            .and_then(Value::as_str)
            .unwrap_or("Dataset");

        Ok(json!({
            "title": title,
            "tiff_file_count": tiff_file_count(object),
        }))
    }
}
