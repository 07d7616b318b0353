//! Backend configuration types
//!
//! [`BackendConfig`] is a closed sum type: a filesystem config can never be
//! mistaken for a database one. Its JSON form keeps the tagged layout used by
//! persisted settings (`{"type": "cms", "cms": {...}}`), where only the
//! sub-object named by `type` is read.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, ServiceError};

const REDACTED: &str = "***";

/// Kinds of running article services. `Memory` has no configuration and
/// never appears in settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Markdown + JSON files on local disk
    Filesystem,
    /// SQL database
    Database,
    /// Headless CMS over HTTP
    Cms,
    /// In-process store, never persisted
    Memory,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Filesystem => write!(f, "Filesystem"),
            BackendType::Database => write!(f, "Database"),
            BackendType::Cms => write!(f, "CMS"),
            BackendType::Memory => write!(f, "Memory"),
        }
    }
}

/// Filesystem backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemConfig {
    /// Root holding one directory per article
    pub articles_path: PathBuf,
    /// Public mirror for article assets; empty disables mirroring
    #[serde(default)]
    pub assets_path: PathBuf,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            articles_path: PathBuf::from("content/articles"),
            assets_path: PathBuf::from("public/articles"),
        }
    }
}

/// SQL dialects a database backend can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgresql,
    Mysql,
    Sqlite,
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Postgresql => write!(f, "PostgreSQL"),
            DatabaseKind::Mysql => write!(f, "MySQL"),
            DatabaseKind::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Database backend configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Database file, SQLite only
    #[serde(default)]
    pub filename: Option<PathBuf>,
}

impl DatabaseConfig {
    /// A SQLite configuration for the given file
    pub fn sqlite(filename: impl Into<PathBuf>) -> Self {
        Self {
            kind: DatabaseKind::Sqlite,
            host: String::new(),
            port: None,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            filename: Some(filename.into()),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("filename", &self.filename)
            .finish()
    }
}

/// Headless CMS products with a field mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmsKind {
    Strapi,
    Contentful,
    Sanity,
    Ghost,
    /// Any REST API speaking the canonical article JSON
    Custom,
}

impl fmt::Display for CmsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmsKind::Strapi => write!(f, "Strapi"),
            CmsKind::Contentful => write!(f, "Contentful"),
            CmsKind::Sanity => write!(f, "Sanity"),
            CmsKind::Ghost => write!(f, "Ghost"),
            CmsKind::Custom => write!(f, "Custom"),
        }
    }
}

/// CMS backend configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsConfig {
    #[serde(rename = "type")]
    pub kind: CmsKind,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Contentful space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    /// Contentful environment, `master` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Sanity project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Sanity dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl CmsConfig {
    pub fn new(kind: CmsKind, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_url: api_url.into(),
            api_key: api_key.into(),
            space_id: None,
            environment: None,
            project_id: None,
            dataset: None,
        }
    }
}

impl fmt::Debug for CmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("space_id", &self.space_id)
            .field("environment", &self.environment)
            .field("project_id", &self.project_id)
            .field("dataset", &self.dataset)
            .finish()
    }
}

/// Configuration for one article backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBackendConfig", into = "RawBackendConfig")]
pub enum BackendConfig {
    Filesystem(FilesystemConfig),
    Database(DatabaseConfig),
    Cms(CmsConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Filesystem(FilesystemConfig::default())
    }
}

impl BackendConfig {
    /// Returns the backend type this config selects
    pub fn backend_type(&self) -> BackendType {
        match self {
            BackendConfig::Filesystem(_) => BackendType::Filesystem,
            BackendConfig::Database(_) => BackendType::Database,
            BackendConfig::Cms(_) => BackendType::Cms,
        }
    }

    /// Parses the persisted JSON form, reporting any mismatch as a
    /// configuration error
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ServiceError::Configuration(e.to_string()))
    }

    /// Checks that every field the selected backend needs is present
    pub fn validate(&self) -> Result<()> {
        match self {
            BackendConfig::Filesystem(fs) => {
                if fs.articles_path.as_os_str().is_empty() {
                    return Err(config_error("filesystem backend requires articlesPath"));
                }
            }
            BackendConfig::Database(db) => match db.kind {
                DatabaseKind::Sqlite => {
                    let missing = db
                        .filename
                        .as_ref()
                        .map_or(true, |f| f.as_os_str().is_empty());
                    if missing {
                        return Err(config_error("sqlite backend requires a filename"));
                    }
                }
                DatabaseKind::Postgresql | DatabaseKind::Mysql => {
                    if db.host.trim().is_empty() {
                        return Err(config_error(format!("{} backend requires a host", db.kind)));
                    }
                    if db.database.trim().is_empty() {
                        return Err(config_error(format!(
                            "{} backend requires a database name",
                            db.kind
                        )));
                    }
                }
            },
            BackendConfig::Cms(cms) => {
                let url = cms.api_url.trim();
                if url.is_empty() {
                    return Err(config_error(format!("{} backend requires apiUrl", cms.kind)));
                }
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(config_error(format!(
                        "{} apiUrl must be an http(s) URL",
                        cms.kind
                    )));
                }
                match cms.kind {
                    CmsKind::Contentful => {
                        if is_blank(&cms.space_id) {
                            return Err(config_error("contentful backend requires spaceId"));
                        }
                        if cms.api_key.trim().is_empty() {
                            return Err(config_error("contentful backend requires apiKey"));
                        }
                    }
                    CmsKind::Sanity => {
                        if is_blank(&cms.project_id) || is_blank(&cms.dataset) {
                            return Err(config_error(
                                "sanity backend requires projectId and dataset",
                            ));
                        }
                    }
                    CmsKind::Strapi | CmsKind::Ghost | CmsKind::Custom => {}
                }
            }
        }
        Ok(())
    }

    /// Copy with secrets blanked out, safe to log or display
    pub fn redacted(&self) -> Self {
        match self {
            BackendConfig::Filesystem(fs) => BackendConfig::Filesystem(fs.clone()),
            BackendConfig::Database(db) => {
                let mut db = db.clone();
                if !db.password.is_empty() {
                    db.password = REDACTED.to_string();
                }
                BackendConfig::Database(db)
            }
            BackendConfig::Cms(cms) => {
                let mut cms = cms.clone();
                if !cms.api_key.is_empty() {
                    cms.api_key = REDACTED.to_string();
                }
                BackendConfig::Cms(cms)
            }
        }
    }

    /// Short human-readable description, free of secrets
    pub fn describe(&self) -> String {
        match self {
            BackendConfig::Filesystem(fs) => {
                format!("Filesystem ({})", fs.articles_path.display())
            }
            BackendConfig::Database(db) => match db.kind {
                DatabaseKind::Sqlite => format!(
                    "SQLite ({})",
                    db.filename
                        .as_ref()
                        .map(|f| f.display().to_string())
                        .unwrap_or_default()
                ),
                _ => format!("{} ({}/{})", db.kind, db.host, db.database),
            },
            BackendConfig::Cms(cms) => format!("{} CMS ({})", cms.kind, cms.api_url),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn config_error(msg: impl Into<String>) -> ServiceError {
    ServiceError::Configuration(msg.into())
}

fn redact(secret: &str) -> &str {
    if secret.is_empty() {
        ""
    } else {
        REDACTED
    }
}

/// Persisted wire form of [`BackendConfig`]. Sub-objects stay untyped so a
/// malformed entry for a backend that is not selected cannot break parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBackendConfig {
    #[serde(rename = "type")]
    backend_type: ConfigTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filesystem: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cms: Option<serde_json::Value>,
}

/// Values of the `type` tag in persisted configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ConfigTag {
    Filesystem,
    Database,
    Cms,
}

fn sub_config<T: serde::de::DeserializeOwned>(
    name: &str,
    value: Option<serde_json::Value>,
) -> std::result::Result<T, String> {
    let value = value.ok_or_else(|| format!("type is '{}' but no {} settings given", name, name))?;
    serde_json::from_value(value).map_err(|e| format!("invalid {} settings: {}", name, e))
}

impl TryFrom<RawBackendConfig> for BackendConfig {
    type Error = String;

    fn try_from(raw: RawBackendConfig) -> std::result::Result<Self, Self::Error> {
        match raw.backend_type {
            ConfigTag::Filesystem => {
                sub_config("filesystem", raw.filesystem).map(BackendConfig::Filesystem)
            }
            ConfigTag::Database => {
                sub_config("database", raw.database).map(BackendConfig::Database)
            }
            ConfigTag::Cms => sub_config("cms", raw.cms).map(BackendConfig::Cms),
        }
    }
}

impl From<BackendConfig> for RawBackendConfig {
    fn from(config: BackendConfig) -> Self {
        let tag = match &config {
            BackendConfig::Filesystem(_) => ConfigTag::Filesystem,
            BackendConfig::Database(_) => ConfigTag::Database,
            BackendConfig::Cms(_) => ConfigTag::Cms,
        };
        let mut raw = RawBackendConfig {
            backend_type: tag,
            filesystem: None,
            database: None,
            cms: None,
        };
        // Plain data structs; serializing them to a Value cannot fail
        match config {
            BackendConfig::Filesystem(fs) => raw.filesystem = serde_json::to_value(fs).ok(),
            BackendConfig::Database(db) => raw.database = serde_json::to_value(db).ok(),
            BackendConfig::Cms(cms) => raw.cms = serde_json::to_value(cms).ok(),
        }
        raw
    }
}

/// Tuning knobs for migrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationSettings {
    pub batch_size: usize,
    pub preserve_assets: bool,
    pub backup_before: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            preserve_assets: true,
            backup_before: false,
        }
    }
}

/// Process-wide backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    pub primary: BackendConfig,
    #[serde(default)]
    pub fallback: Option<BackendConfig>,
    #[serde(default)]
    pub sync_enabled: bool,
    #[serde(default)]
    pub migration_settings: MigrationSettings,
}

/// Partial settings update. `fallback: Some(None)` clears the fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub primary: Option<BackendConfig>,
    pub fallback: Option<Option<BackendConfig>>,
    pub sync_enabled: Option<bool>,
    pub migration_settings: Option<MigrationSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_is_not_a_config_type() {
        let err = BackendConfig::from_json(r#"{"type": "memory"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_parse_tagged_form_ignores_other_sub_objects() {
        let json = r#"{
            "type": "filesystem",
            "filesystem": {"articlesPath": "content/articles", "assetsPath": "public/articles"},
            "cms": {"type": "wordpress"}
        }"#;
        let config = BackendConfig::from_json(json).unwrap();
        assert_eq!(
            config,
            BackendConfig::Filesystem(FilesystemConfig {
                articles_path: PathBuf::from("content/articles"),
                assets_path: PathBuf::from("public/articles"),
            })
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_sub_object_is_configuration_error() {
        let err = BackendConfig::from_json(r#"{"type": "database"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_serialize_round_trip_keeps_tagged_layout() {
        let config = BackendConfig::Database(DatabaseConfig::sqlite("articles.db"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "database");
        assert_eq!(json["database"]["type"], "sqlite");
        assert!(json.get("cms").is_none());
        let back: BackendConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_cms_requirements() {
        let missing_url = BackendConfig::Cms(CmsConfig::new(CmsKind::Strapi, "", "k"));
        assert!(matches!(
            missing_url.validate(),
            Err(ServiceError::Configuration(_))
        ));

        let mut contentful = CmsConfig::new(CmsKind::Contentful, "https://cdn.contentful.com", "k");
        assert!(BackendConfig::Cms(contentful.clone()).validate().is_err());
        contentful.space_id = Some("space".to_string());
        BackendConfig::Cms(contentful).validate().unwrap();

        let mut sanity = CmsConfig::new(CmsKind::Sanity, "https://abc.api.sanity.io/v2021-10-21", "");
        sanity.project_id = Some("abc".to_string());
        assert!(BackendConfig::Cms(sanity.clone()).validate().is_err());
        sanity.dataset = Some("production".to_string());
        BackendConfig::Cms(sanity).validate().unwrap();
    }

    #[test]
    fn test_validate_database_requirements() {
        let mut sqlite = DatabaseConfig::sqlite("");
        assert!(BackendConfig::Database(sqlite.clone()).validate().is_err());
        sqlite.filename = Some(PathBuf::from("blog.db"));
        BackendConfig::Database(sqlite).validate().unwrap();

        let mut pg = DatabaseConfig::sqlite("ignored");
        pg.kind = DatabaseKind::Postgresql;
        assert!(BackendConfig::Database(pg.clone()).validate().is_err());
        pg.host = "db.internal".to_string();
        pg.database = "blog".to_string();
        BackendConfig::Database(pg).validate().unwrap();
    }

    #[test]
    fn test_secrets_never_reach_debug_output() {
        let mut db = DatabaseConfig::sqlite("x.db");
        db.password = "hunter2".to_string();
        let cms = CmsConfig::new(CmsKind::Strapi, "https://cms.example.com", "sk_live_123");

        let debug = format!("{:?} {:?}", db, cms);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sk_live_123"));

        let redacted = BackendConfig::Cms(cms).redacted();
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("sk_live_123"));
        assert!(json.contains("***"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: BackendSettings = serde_json::from_str(
            r#"{"primary": {"type": "filesystem", "filesystem": {"articlesPath": "a"}}}"#,
        )
        .unwrap();
        assert!(settings.fallback.is_none());
        assert!(!settings.sync_enabled);
        assert_eq!(settings.migration_settings.batch_size, 10);
        assert!(settings.migration_settings.preserve_assets);
    }
}
