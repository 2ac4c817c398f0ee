// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Opaque per-source configuration block, e.g. the `[s3]` section
pub type SourceConfig = HashMap<String, String>;

/// Default configuration file location
pub const DEFAULT_CONFIG_FILE: &str = "/var/cron.d/filesync.ini";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub agent: AgentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Configuration block of the selected file source, if present
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_watermark_file")]
    pub watermark_file: PathBuf,
    #[serde(default = "default_workflow")]
    pub workflow: String,
    pub backend_url: String,
    /// File holding backend credentials
    pub vault_file: PathBuf,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default)]
    pub on_corrupt_watermark: CorruptWatermarkPolicy,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

/// What to do when the persisted watermark cannot be parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptWatermarkPolicy {
    /// Abort the cycle and leave the file for an operator to inspect
    #[default]
    Abort,
    /// Treat the watermark as absent and rescan everything
    Rescan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

fn default_watermark_file() -> PathBuf {
    PathBuf::from("/var/data/filesync/watermark")
}

fn default_workflow() -> String {
    "geotiff_image_processing".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_verify_tls() -> bool {
    true
}

fn default_poll_interval_seconds() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn file_format(path: &Path) -> FileFormat {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("toml") => FileFormat::Toml,
        Some("json") => FileFormat::Json,
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        _ => FileFormat::Ini,
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env.
    ///
    /// `file_source` names the section whose keys become [`Settings::source`].
    /// The file must exist. It is read as INI unless its extension names
    /// another format (toml, json, yaml).
    pub fn load<P: AsRef<Path>>(config_file: P, file_source: &str) -> Result<Self, ConfigError> {
        let config_file = config_file.as_ref();

        let config = Config::builder()
            .add_source(
                File::from(config_file)
                    .format(file_format(config_file))
                    .required(true),
            )
            .add_source(
                Environment::with_prefix("FILE_SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(&config, file_source)
    }

    fn from_config(config: &Config, file_source: &str) -> Result<Self, ConfigError> {
        let agent: AgentConfig = config.get("agent")?;

        let observability = match config.get::<ObservabilityConfig>("observability") {
            Ok(observability) => observability,
            Err(ConfigError::NotFound(_)) => ObservabilityConfig::default(),
            Err(e) => return Err(e),
        };

        let source = match config.get::<SourceConfig>(file_source) {
            Ok(source) => source,
            Err(ConfigError::NotFound(_)) => SourceConfig::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            agent,
            observability,
            source,
        })
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.agent.backend_url.trim().is_empty() {
            return Err("Backend URL cannot be empty".to_string());
        }
        if self.agent.vault_file.as_os_str().is_empty() {
            return Err("Vault file cannot be empty".to_string());
        }
        if self.agent.watermark_file.as_os_str().is_empty() {
            return Err("Watermark file cannot be empty".to_string());
        }
        if self.agent.workflow.trim().is_empty() {
            return Err("Workflow type cannot be empty".to_string());
        }
        if self.agent.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }
        if self.agent.poll_interval_seconds == 0 {
            return Err("Poll interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                watermark_file: default_watermark_file(),
                workflow: default_workflow(),
                backend_url: "http://localhost:8000".to_string(),
                vault_file: PathBuf::from("/var/data/filesync/vault"),
                request_timeout_seconds: default_request_timeout_seconds(),
                verify_tls: default_verify_tls(),
                on_corrupt_watermark: CorruptWatermarkPolicy::Abort,
                poll_interval_seconds: default_poll_interval_seconds(),
            },
            observability: ObservabilityConfig::default(),
            source: SourceConfig::new(),
        }
    }
}
