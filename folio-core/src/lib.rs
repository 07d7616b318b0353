//! Folio core: article storage backends and the manager that selects,
//! switches, migrates and syncs between them.

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod models;
pub mod settings;

// Re-export commonly used types
pub use backend::{
    create_service, ArticleService, CmsBackend, DefaultServiceFactory, FilesystemBackend,
    MemoryBackend, PdfRenderer, ServiceFactory, SqliteBackend,
};
pub use config::{
    BackendConfig, BackendSettings, BackendType, CmsConfig, CmsKind, DatabaseConfig,
    DatabaseKind, FilesystemConfig, MigrationSettings, SettingsPatch,
};
pub use error::{Result, ServiceError};
pub use logging::{init_logger, LogConfig, LogFormat, LogLevel};
pub use manager::{BackendInfo, BackendManager, MigrationOptions, MigrationReport, SyncReport};
pub use models::{
    slugify, Article, ArticleMetadata, ArticleUpdate, BulkDeleteResult, ImportedArticle,
    MetadataPatch, SeoMetadata,
};
pub use settings::{default_settings_path, SettingsFormat, SettingsStore, SETTINGS_ENV};
pub use tokio_util::sync::CancellationToken;
