use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SmError, SmResult};

/// Top-level configuration (loaded from securematch.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmConfig {
    pub keys: KeysConfig,
    pub index: IndexConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Environment variable holding the base64-encoded 32-byte master key
    pub master_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Document fields tokenized into the search index at ingestion.
    /// Every other field is encrypted but not searchable.
    pub searchable_fields: Vec<String>,
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Fs,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            master_key_env: "MASTER_KEY".into(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            searchable_fields: vec!["email".into(), "name".into(), "phone".into()],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("~/.local/share/securematch"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "securematch".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl SmConfig {
    /// Parse a TOML config string.
    pub fn from_toml(content: &str) -> SmResult<Self> {
        let config: SmConfig =
            toml::from_str(content).map_err(|e| SmError::Configuration(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults if it does not exist.
    /// Reporting the missing file is left to the caller, which may not have
    /// a subscriber installed yet.
    pub fn load(path: &Path) -> SmResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| SmError::Configuration(format!("reading config {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> SmResult<()> {
        if self.keys.master_key_env.trim().is_empty() {
            return Err(SmError::Configuration(
                "keys.master_key_env must name an environment variable".into(),
            ));
        }
        if let Some(field) = self.index.searchable_fields.iter().find(|f| f.trim().is_empty()) {
            return Err(SmError::Configuration(format!(
                "index.searchable_fields contains an empty field name: {field:?}"
            )));
        }
        Ok(())
    }
}
