//! Configuration management for sample-health
//!
//! Stores settings in ~/.config/sample-health/config.json. Environment
//! variables override the file; CLI flags override both.

use crate::llm::Model;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_LOOPS: u32 = 3;
pub const DEFAULT_ACCEPTANCE_THRESHOLD: u8 = 7;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_MAX_LOOPS: &str = "SAMPLE_HEALTH_MAX_LOOPS";
pub const ENV_THRESHOLD: &str = "SAMPLE_HEALTH_THRESHOLD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    /// Override for the chat-completions endpoint
    pub openrouter_url: Option<String>,
    pub smart_model: Option<String>,
    pub speed_model: Option<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on analyze/validate round trips
    pub max_loops: u32,
    /// Validation scores strictly above this are accepted
    pub acceptance_threshold: u8,
    /// Product catalog TOML; the built-in catalog is used when unset
    pub products_path: Option<PathBuf>,
    pub allow_generative_category: bool,
    /// Reject samples without region tags before analysis
    pub require_region_tags: bool,
    /// Reject samples in languages outside the supported set
    pub restrict_languages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openrouter_url: None,
            smart_model: None,
            speed_model: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_loops: DEFAULT_MAX_LOOPS,
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            products_path: None,
            allow_generative_category: true,
            require_region_tags: false,
            restrict_languages: false,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sample-health"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A missing file yields defaults; a corrupt
    /// one is moved aside to `config.json.corrupt` and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory '{}'", dir.display())
            })?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content)
            .with_context(|| format!("Failed to write config '{}'", path.display()))
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored with a warning.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.openrouter_api_key = Some(key.trim().to_string());
        }
        if let Some(raw) = lookup(ENV_MAX_LOOPS) {
            match raw.trim().parse::<u32>() {
                Ok(value) => self.max_loops = value,
                Err(_) => {
                    tracing::warn!(var = ENV_MAX_LOOPS, value = %raw, "ignoring invalid value")
                }
            }
        }
        if let Some(raw) = lookup(ENV_THRESHOLD) {
            match raw.trim().parse::<u8>() {
                Ok(value) => self.acceptance_threshold = value,
                Err(_) => {
                    tracing::warn!(var = ENV_THRESHOLD, value = %raw, "ignoring invalid value")
                }
            }
        }
    }

    /// Get the OpenRouter API key (environment first, then config file)
    pub fn get_api_key(&self) -> Option<String> {
        std::env::var(ENV_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.openrouter_api_key.clone())
    }

    /// `max_loops` with values below one raised to one.
    pub fn effective_max_loops(&self) -> u32 {
        self.max_loops.max(1)
    }

    pub fn model_id(&self, model: Model) -> String {
        let configured = match model {
            Model::Smart => self.smart_model.as_deref(),
            Model::Speed => self.speed_model.as_deref(),
        };
        configured
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| model.default_id())
            .to_string()
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/sample-health/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.openrouter_api_key.is_none());
        assert_eq!(config.max_loops, 3);
        assert_eq!(config.acceptance_threshold, 7);
        assert!(config.allow_generative_category);
        assert!(!config.require_region_tags);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json"));
        assert_eq!(config.max_loops, DEFAULT_MAX_LOOPS);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"max_loops": 5, "smart_model": "x/y"}"#).unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.max_loops, 5);
        assert_eq!(config.acceptance_threshold, DEFAULT_ACCEPTANCE_THRESHOLD);
        assert_eq!(config.model_id(Model::Smart), "x/y");
        assert_eq!(config.model_id(Model::Speed), Model::Speed.default_id());
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.max_loops, DEFAULT_MAX_LOOPS);
        assert!(!path.exists());
        let backup = fs::read_to_string(dir.path().join("config.json.corrupt")).unwrap();
        assert_eq!(backup, "{not json");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            acceptance_threshold: 8,
            restrict_languages: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        assert_eq!(loaded.acceptance_threshold, 8);
        assert!(loaded.restrict_languages);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_LOOPS, "0"),
            (ENV_THRESHOLD, "not a number"),
            (ENV_API_KEY, " sk-test "),
        ]);
        let mut config = Config::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_loops, 0);
        assert_eq!(config.effective_max_loops(), 1);
        assert_eq!(config.acceptance_threshold, DEFAULT_ACCEPTANCE_THRESHOLD);
        assert_eq!(config.openrouter_api_key.as_deref(), Some("sk-test"));
    }
}
