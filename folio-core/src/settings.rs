//! Persistence for [`BackendSettings`]
//!
//! Settings live in a single file whose format follows its extension:
//! `.yaml`/`.yml` for YAML, anything else JSON.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::BackendSettings;
use crate::error::{Result, ServiceError};

/// Environment variable overriding the settings file location
pub const SETTINGS_ENV: &str = "FOLIO_SETTINGS";

/// On-disk format of a settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Yaml,
}

impl SettingsFormat {
    /// Picks the format from the file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SettingsFormat::Yaml
            }
            _ => SettingsFormat::Json,
        }
    }
}

/// Loads and saves backend settings at a fixed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location (see [`default_settings_path`])
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_settings_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SettingsFormat {
        SettingsFormat::from_path(&self.path)
    }

    /// Loads the settings; a missing file yields the defaults
    pub fn load(&self) -> Result<BackendSettings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(BackendSettings::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ServiceError::io(&self.path, e))?;
        let parsed = match self.format() {
            SettingsFormat::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
            SettingsFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| {
            ServiceError::Configuration(format!(
                "failed to parse settings file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Writes the settings, creating parent directories as needed
    ///
    /// The file is written next to its destination and renamed into place
    /// so readers never observe a partial file.
    pub fn save(&self, settings: &BackendSettings) -> Result<()> {
        let content = match self.format() {
            SettingsFormat::Json => serde_json::to_string_pretty(settings)?,
            SettingsFormat::Yaml => serde_yaml::to_string(settings).map_err(|e| {
                ServiceError::Configuration(format!("failed to serialize settings: {}", e))
            })?,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ServiceError::io(parent, e))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings".to_string());
        let temp = self.path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&temp, content).map_err(|e| ServiceError::io(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| ServiceError::io(&self.path, e))?;

        info!(path = %self.path.display(), "Saved backend settings");
        Ok(())
    }
}

/// `FOLIO_SETTINGS` if set, else `<config dir>/folio/backend.json`
pub fn default_settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    let config_dir = dirs::config_dir().ok_or_else(|| {
        ServiceError::Configuration("failed to determine the user config directory".to_string())
    })?;
    Ok(config_dir.join("folio").join("backend.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, CmsConfig, CmsKind, DatabaseConfig};
    use tempfile::TempDir;

    fn sample_settings() -> BackendSettings {
        let mut settings = BackendSettings::default();
        settings.primary = BackendConfig::Database(DatabaseConfig::sqlite("data/folio.db"));
        settings.fallback = Some(BackendConfig::Cms(CmsConfig::new(
            CmsKind::Strapi,
            "https://cms.example.com",
            "token",
        )));
        settings.sync_enabled = true;
        settings.migration_settings.batch_size = 25;
        settings
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load().unwrap(), BackendSettings::default());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("backend.json"));
        let settings = sample_settings();
        store.save(&settings).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"syncEnabled\": true"));
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("backend.yml"));
        assert_eq!(store.format(), SettingsFormat::Yaml);
        let settings = sample_settings();
        store.save(&settings).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("syncEnabled: true"));
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_malformed_file_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backend.json");
        fs::write(&path, "{ not json").unwrap();
        let err = SettingsStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }
}
