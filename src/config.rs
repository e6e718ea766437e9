use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub stt: SttConfig,
    pub session: SessionConfig,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Model selection as `provider/model`, e.g. "deepgram/nova-3" or "local/base.en"
    pub model: String,
    /// Language code or "auto" for detection
    pub language: String,
    /// Directory holding on-device model files
    pub model_dir: PathBuf,
}

/// Session timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds to wait for a commit acknowledgment before returning
    pub commit_timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            model_dir: PathBuf::from(defaults::DEFAULT_MODEL_DIR),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            commit_timeout_secs: defaults::COMMIT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - `SOTTO_MODEL` — model selection (`provider/model`)
    /// - `SOTTO_LANGUAGE` — language code or "auto"
    /// - `SOTTO_MODEL_DIR` — on-device model directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("SOTTO_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }
        if let Ok(language) = std::env::var("SOTTO_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }
        if let Ok(dir) = std::env::var("SOTTO_MODEL_DIR")
            && !dir.is_empty()
        {
            self.stt.model_dir = PathBuf::from(dir);
        }
    }
}
