//! Storage backends for articles
//!
//! Every backend implements [`ArticleService`], so the rest of the system
//! can read and write articles without knowing whether they live in
//! directories on disk, in a SQLite file or in a headless CMS.

mod cms;
mod filesystem_backend;
mod memory_backend;
mod migration;
mod sqlite_backend;
mod traits;

pub use cms::{
    CmsAdapter, CmsBackend, CmsHttp, ContentfulAdapter, CustomAdapter, GhostAdapter,
    RemoteArticle, SanityAdapter, StrapiAdapter,
};
pub use filesystem_backend::{FilesystemBackend, IndexEntry, INDEX_FILE};
pub use memory_backend::MemoryBackend;
pub use migration::{copy_articles, sync_articles, write_backup, CopyOutcome, SyncOutcome};
pub use sqlite_backend::SqliteBackend;
pub use traits::{ArticleService, PdfRenderer};

use std::sync::Arc;

use crate::config::{BackendConfig, DatabaseKind};
use crate::error::{Result, ServiceError};

/// Creates the article service a configuration selects
///
/// The config is validated first, so a missing required field is always a
/// `Configuration` error and never reaches a backend constructor.
pub fn create_service(config: &BackendConfig) -> Result<Arc<dyn ArticleService>> {
    config.validate()?;

    match config {
        BackendConfig::Filesystem(fs) => Ok(Arc::new(FilesystemBackend::new(fs))),
        BackendConfig::Database(db) => match db.kind {
            DatabaseKind::Sqlite => {
                // validate() guarantees a filename
                let filename = db.filename.clone().unwrap_or_default();
                Ok(Arc::new(SqliteBackend::new(filename)?))
            }
            DatabaseKind::Postgresql | DatabaseKind::Mysql => Err(ServiceError::Unsupported(
                format!("{} backend is not available in this build", db.kind),
            )),
        },
        BackendConfig::Cms(cms) => Ok(Arc::new(CmsBackend::new(cms)?)),
    }
}

/// Builds services from configs; the backend manager goes through this so
/// callers can substitute their own construction
pub trait ServiceFactory: Send + Sync {
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ArticleService>>;
}

/// Factory backed by [`create_service`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultServiceFactory;

impl ServiceFactory for DefaultServiceFactory {
    fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ArticleService>> {
        create_service(config)
    }
}
