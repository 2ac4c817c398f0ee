// Backend credentials read from a vault file of KEY=VALUE lines

use crate::errors::BackendError;
use config::{Config, ConfigError, File, FileFormat};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Username and password for the backend token endpoint
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Reference to the file holding `USERNAME` and `PASSWORD`
#[derive(Debug, Clone)]
pub struct VaultFile {
    path: PathBuf,
}

impl VaultFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read credentials; any problem is an authentication failure
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Credentials, BackendError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            BackendError::AuthFailure(format!(
                "Failed to read vault file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        parse_vault(&content).map_err(|reason| {
            BackendError::AuthFailure(format!(
                "Invalid vault file '{}': {}",
                self.path.display(),
                reason
            ))
        })
    }
}

const VAULT_SECTION: &str = "vault";

/// Parse `KEY=VALUE` (or `KEY: VALUE`) lines as an INI body; keys are case-insensitive
pub fn parse_vault(content: &str) -> Result<Credentials, String> {
    let vault = Config::builder()
        .add_source(File::from_str(
            &format!("[{}]\n{}", VAULT_SECTION, content),
            FileFormat::Ini,
        ))
        .build()
        .map_err(|e| e.to_string())?;

    let take = |key: &str| match vault.get_string(&format!("{}.{}", VAULT_SECTION, key)) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        Ok(_) | Err(ConfigError::NotFound(_)) => {
            Err(format!("missing {}", key.to_ascii_uppercase()))
        }
        Err(e) => Err(e.to_string()),
    };

    Ok(Credentials {
        username: take("username")?,
        password: take("password")?,
    })
}
