// Watermark persistence
// The watermark is the exclusive lower bound of the next discovery scan.

use crate::errors::WatermarkError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Storage for the single watermark timestamp
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Read the persisted watermark, `None` when nothing was persisted yet
    async fn read(&self) -> Result<Option<DateTime<Utc>>, WatermarkError>;

    /// Replace the persisted watermark atomically
    async fn write(&self, watermark: DateTime<Utc>) -> Result<(), WatermarkError>;
}

/// Watermark kept as a single ISO-8601 line in a file
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> WatermarkError {
        WatermarkError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "watermark".to_string());
        self.path
            .with_file_name(format!(".{}.tmp-{}", name, Uuid::new_v4()))
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn read(&self) -> Result<Option<DateTime<Utc>>, WatermarkError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No watermark file present");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let line = content.lines().next().unwrap_or_default();
        parse_watermark(line)
            .map(Some)
            .map_err(|reason| WatermarkError::Corrupt {
                path: self.path.display().to_string(),
                reason,
            })
    }

    #[instrument(skip(self), fields(path = %self.path.display(), watermark = %watermark))]
    async fn write(&self, watermark: DateTime<Utc>) -> Result<(), WatermarkError> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)
            .await
            .map_err(|e| self.io_error(e))?;

        let temp_path = self.temp_path();
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(format_watermark(watermark).as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(self.io_error(e));
        }

        sync_dir(parent).await.map_err(|e| self.io_error(e))?;

        debug!("Watermark persisted");
        Ok(())
    }
}

/// Flush a directory entry so a completed rename survives a crash
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Render a watermark the way it is persisted, e.g. `2021-03-04T05:06:07.123456+00:00`
pub fn format_watermark(watermark: DateTime<Utc>) -> String {
    watermark.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_watermark(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty watermark".to_string());
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts.and_utc());
        }
    }

    Err(format!("'{}' is not an ISO-8601 timestamp", raw))
}
