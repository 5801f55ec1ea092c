use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::mime;

/// Engine-wide configuration. Loaded once at startup and handed to the
/// service facade; per-import knobs live on `ImportOptions` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the catalog database file. `:memory:` is accepted for tests.
    pub database_path: String,
    /// Directory for derived-image temp files created during imports.
    pub working_dir: String,
    /// MIME types admitted by the directory scanner, as `top/sub` strings.
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Concurrent MIME classifications during a scan.
    #[serde(default = "default_classify_jobs")]
    pub classify_jobs: usize,
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/tiff".to_string(),
    ]
}

fn default_classify_jobs() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            working_dir: String::new(),
            allowed_types: default_allowed_types(),
            classify_jobs: default_classify_jobs(),
        }
    }
}

impl EngineConfig {
    pub fn new(database_path: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    /// Reads a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the rest of the engine assumes.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.database_path.is_empty() {
            return Err(CoreError::InvalidConfig("database_path is required".into()));
        }
        if self.working_dir.is_empty() {
            return Err(CoreError::InvalidConfig("working_dir is required".into()));
        }
        if self.classify_jobs == 0 {
            return Err(CoreError::InvalidConfig("classify_jobs must be >= 1".into()));
        }
        for t in &self.allowed_types {
            if mime::parse_mime(t).is_none() {
                return Err(CoreError::InvalidConfig(format!(
                    "allowed_types entry {:?} is not a top/sub MIME pair",
                    t
                )));
            }
        }
        Ok(())
    }

    pub fn working_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.working_dir)
    }

    pub fn allowed_mime_types(&self) -> Vec<mime::MimeType> {
        self.allowed_types
            .iter()
            .filter_map(|t| mime::parse_mime(t))
            .collect()
    }
}
