use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Environment variable that overrides `metadata.api_key`.
pub const API_KEY_ENV: &str = "MARQUEE_TMDB_API_KEY";

/// Upper bound on concurrent metadata lookups, whatever the config says.
pub const MAX_CONCURRENCY: usize = 16;

const MAX_AGE_CAP_MINUTES: u64 = 10 * 365 * 24 * 60;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub proxy: ProxyConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_to_file: bool,
    pub revalidate_minutes: u64,
    pub cache_max_age_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub default_endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
    pub image_base: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`.
    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl GeneralConfig {
    /// `None` when scheduled revalidation is disabled.
    pub fn revalidate_interval(&self) -> Option<Duration> {
        (self.revalidate_minutes > 0).then(|| Duration::from_secs(self.revalidate_minutes * 60))
    }

    /// Capped at ten years.
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_max_age_minutes.min(MAX_AGE_CAP_MINUTES) as i64)
    }
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults,
    /// then environment overrides.
    pub fn load() -> Result<Self, MarqueeError> {
        let mut config = Self::load_from(&Self::config_path())?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.metadata.api_key = key.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Load `path` merged over the built-in defaults. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, MarqueeError> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| MarqueeError::Config(e.to_string()))?;

        if path.exists() {
            let user_str = std::fs::read_to_string(path)?;
            let user: toml::Value = toml::from_str(&user_str)
                .map_err(|e| MarqueeError::Config(format!("{}: {e}", path.display())))?;
            merge_toml(&mut merged, user);
        }

        merged
            .try_into()
            .map_err(|e: toml::de::Error| MarqueeError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::data_dir().join("marquee.db")
    }

    /// Directory for rolling log files.
    pub fn log_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, MarqueeError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "marquee")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

/// Recursively overlay `overlay` onto `base`. Tables merge key by key;
/// any other value replaces.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.proxy.default_endpoint, "https://lbox-proxy.nellrun.workers.dev");
        assert_eq!(config.metadata.image_base, "https://image.tmdb.org/t/p/w300");
        assert_eq!(config.metadata.concurrency(), 8);
        assert!(!config.general.log_to_file);
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.metadata.language, config.metadata.language);
    }

    #[test]
    fn test_partial_user_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[metadata]\nlanguage = \"ru-RU\"\nconcurrency = 64\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.metadata.language, "ru-RU");
        assert_eq!(config.metadata.concurrency(), MAX_CONCURRENCY);
        // Untouched keys keep their defaults.
        assert_eq!(config.metadata.timeout_secs, 10);
        assert_eq!(config.proxy.timeout_secs, 15);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.general.revalidate_minutes, 30);
    }

    #[test]
    fn test_invalid_user_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[proxy]\ntimeout_secs = \"soon\"\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(MarqueeError::Config(_))));
    }

    #[test]
    fn test_partial_user_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nrevalidate_minutes = 0\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.general.revalidate_interval(), None);
        assert_eq!(
            loaded.general.cache_max_age_minutes,
            AppConfig::default().general.cache_max_age_minutes
        );
    }
}
