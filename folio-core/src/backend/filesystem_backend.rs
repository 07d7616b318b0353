//! Filesystem article backend
//!
//! One directory per article under `articles_path`:
//!
//! ```text
//! <slug>/metadata.json
//! <slug>/article.md
//! <slug>/assets/<file>
//! articles.json          derived index, rebuilt after every mutation
//! ```
//!
//! Asset files are mirrored into `assets_path/<slug>/` for public serving.
//! Reads always scan the directories; the index is never trusted.

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::traits::ArticleService;
use crate::archive::{is_safe_file_name, ASSETS_DIR, CONTENT_FILE, METADATA_FILE};
use crate::config::{BackendType, FilesystemConfig};
use crate::error::{Result, ServiceError};
use crate::models::{
    is_valid_slug, sort_articles, Article, ArticleMetadata, ArticleUpdate, BulkDeleteResult,
};

pub const INDEX_FILE: &str = "articles.json";
const LOCK_FILE: &str = ".articles.lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Flattened index entry: the slug next to its metadata fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub slug: String,
    #[serde(flatten)]
    pub metadata: ArticleMetadata,
}

/// Filesystem backend implementation
pub struct FilesystemBackend {
    store: Arc<FsStore>,
}

impl FilesystemBackend {
    /// Creates a backend for the given config. Nothing touches the disk
    /// until the first operation.
    pub fn new(config: &FilesystemConfig) -> Self {
        let assets_path = Some(config.assets_path.clone()).filter(|p| !p.as_os_str().is_empty());
        Self {
            store: Arc::new(FsStore {
                articles_path: config.articles_path.clone(),
                assets_path,
            }),
        }
    }

    /// Path of the derived index file
    pub fn index_path(&self) -> PathBuf {
        self.store.articles_path.join(INDEX_FILE)
    }

    /// Reads the derived index as last written
    pub fn read_index(&self) -> Result<Vec<IndexEntry>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&path).map_err(|e| ServiceError::io(&path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FsStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store)).await?
    }
}

#[async_trait]
impl ArticleService for FilesystemBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Filesystem
    }

    fn describe(&self) -> String {
        format!("Filesystem ({})", self.store.articles_path.display())
    }

    async fn get_all_articles(&self) -> Result<Vec<Article>> {
        self.run(|store| store.load_all()).await
    }

    async fn get_article(&self, slug: &str) -> Result<Option<Article>> {
        let slug = slug.to_string();
        self.run(move |store| store.load_one(&slug)).await
    }

    async fn create_article(&self, article: &Article) -> Result<()> {
        let article = article.clone();
        self.run(move |store| store.create(&article)).await
    }

    async fn update_article(&self, slug: &str, update: &ArticleUpdate) -> Result<()> {
        let slug = slug.to_string();
        let update = update.clone();
        self.run(move |store| store.update(&slug, &update)).await
    }

    async fn delete_article(&self, slug: &str) -> Result<bool> {
        let slug = slug.to_string();
        self.run(move |store| {
            let _lock = store.acquire_write_lock()?;
            let deleted = store.remove(&slug)?;
            if deleted {
                store.reindex()?;
            }
            Ok(deleted)
        })
        .await
    }

    async fn bulk_delete_articles(&self, slugs: &[String]) -> BulkDeleteResult {
        let requested = slugs.to_vec();
        let slugs = requested.clone();
        let outcome = self
            .run(move |store| {
                let _lock = store.acquire_write_lock()?;
                let mut result = BulkDeleteResult::default();
                for slug in slugs {
                    match store.remove(&slug) {
                        Ok(true) => result.success.push(slug),
                        Ok(false) => result.failed.push(slug),
                        Err(e) => {
                            warn!(slug = %slug, error = %e, "Failed to delete article");
                            result.failed.push(slug);
                        }
                    }
                }
                if let Err(e) = store.reindex() {
                    warn!(error = %e, "Failed to rebuild article index");
                }
                Ok(result)
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Bulk delete could not start");
                BulkDeleteResult {
                    success: Vec::new(),
                    failed: requested,
                }
            }
        }
    }

    async fn read_asset(&self, slug: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let slug = slug.to_string();
        let name = name.to_string();
        self.run(move |store| store.read_asset(&slug, &name)).await
    }

    async fn write_asset(&self, slug: &str, name: &str, data: &[u8]) -> Result<()> {
        let slug = slug.to_string();
        let name = name.to_string();
        let data = data.to_vec();
        self.run(move |store| store.write_asset(&slug, &name, &data))
            .await
    }
}

/// Synchronous half of the backend; always called on a blocking thread
struct FsStore {
    articles_path: PathBuf,
    assets_path: Option<PathBuf>,
}

impl FsStore {
    fn article_dir(&self, slug: &str) -> PathBuf {
        self.articles_path.join(slug)
    }

    fn public_dir(&self, slug: &str) -> Option<PathBuf> {
        self.assets_path.as_ref().map(|p| p.join(slug))
    }

    /// Acquire an exclusive lock for mutations.
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        fs::create_dir_all(&self.articles_path)
            .map_err(|e| ServiceError::io(&self.articles_path, e))?;
        let lock_path = self.articles_path.join(LOCK_FILE);

        let mut lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| ServiceError::io(&lock_path, e))?;

        let start = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(ServiceError::unreachable(format!(
                            "timeout waiting for lock on {}",
                            lock_path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(ServiceError::io(&lock_path, e)),
            }
        }

        // Lock holder info, for debugging only
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        Ok(lock_file)
    }

    fn load_all(&self) -> Result<Vec<Article>> {
        if !self.articles_path.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.articles_path)
            .map_err(|e| ServiceError::io(&self.articles_path, e))?;

        let mut articles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ServiceError::io(&self.articles_path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match self.load_one(&name) {
                Ok(Some(article)) => articles.push(article),
                Ok(None) => debug!(dir = %name, "Directory has no metadata.json, skipping"),
                Err(e) => warn!(dir = %name, error = %e, "Unreadable article, skipping"),
            }
        }
        sort_articles(&mut articles);
        Ok(articles)
    }

    fn load_one(&self, slug: &str) -> Result<Option<Article>> {
        if !is_valid_slug(slug) {
            return Ok(None);
        }
        let dir = self.article_dir(slug);
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Ok(None);
        }

        let raw = fs::read(&metadata_path).map_err(|e| ServiceError::io(&metadata_path, e))?;
        let metadata: ArticleMetadata = serde_json::from_slice(&raw)?;

        let content_path = dir.join(CONTENT_FILE);
        let content = if content_path.is_file() {
            fs::read_to_string(&content_path).map_err(|e| ServiceError::io(&content_path, e))?
        } else {
            String::new()
        };

        Ok(Some(Article {
            slug: slug.to_string(),
            metadata,
            content,
            assets: self.list_assets(slug)?,
        }))
    }

    fn list_assets(&self, slug: &str) -> Result<Vec<String>> {
        let dir = self.article_dir(slug).join(ASSETS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| ServiceError::io(&dir, e))? {
            let entry = entry.map_err(|e| ServiceError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_file() && is_safe_file_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn create(&self, article: &Article) -> Result<()> {
        article.validate().map_err(ServiceError::Validation)?;
        let _lock = self.acquire_write_lock()?;

        let target = self.article_dir(&article.slug);
        if target.exists() {
            return Err(ServiceError::Conflict(article.slug.clone()));
        }

        // Stage everything in a hidden directory so a failed write never
        // leaves a half-created article behind
        let staging = self.articles_path.join(format!(
            ".staging-{}-{}",
            article.slug,
            uuid::Uuid::new_v4().simple()
        ));
        let staged = self.write_article_files(&staging, article).and_then(|_| {
            fs::rename(&staging, &target).map_err(|e| ServiceError::io(&target, e))
        });
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        info!(slug = %article.slug, "Created article");
        self.reindex()
    }

    fn write_article_files(&self, dir: &Path, article: &Article) -> Result<()> {
        let assets_dir = dir.join(ASSETS_DIR);
        fs::create_dir_all(&assets_dir).map_err(|e| ServiceError::io(&assets_dir, e))?;
        let metadata = serde_json::to_vec_pretty(&article.metadata)?;
        write_file(&dir.join(METADATA_FILE), &metadata)?;
        write_file(&dir.join(CONTENT_FILE), article.content.as_bytes())
    }

    fn update(&self, slug: &str, update: &ArticleUpdate) -> Result<()> {
        let _lock = self.acquire_write_lock()?;
        let mut article = self
            .load_one(slug)?
            .ok_or_else(|| ServiceError::NotFound(slug.to_string()))?;
        article.apply_update(update);

        let dir = self.article_dir(slug);
        let metadata = serde_json::to_vec_pretty(&article.metadata)?;
        write_atomic(&dir.join(METADATA_FILE), &metadata)?;
        if update.content.is_some() {
            write_atomic(&dir.join(CONTENT_FILE), article.content.as_bytes())?;
        }
        if let Some(keep) = &update.assets {
            self.prune_assets(slug, keep)?;
        }

        info!(slug = %slug, "Updated article");
        self.reindex()
    }

    /// Removes asset files that are no longer listed
    fn prune_assets(&self, slug: &str, keep: &[String]) -> Result<()> {
        for name in self.list_assets(slug)? {
            if keep.contains(&name) {
                continue;
            }
            let path = self.article_dir(slug).join(ASSETS_DIR).join(&name);
            fs::remove_file(&path).map_err(|e| ServiceError::io(&path, e))?;
            if let Some(public) = self.public_dir(slug) {
                let _ = fs::remove_file(public.join(&name));
            }
        }
        Ok(())
    }

    /// Removes an article directory and its public mirror. Caller holds the lock.
    fn remove(&self, slug: &str) -> Result<bool> {
        if !is_valid_slug(slug) {
            return Ok(false);
        }
        let dir = self.article_dir(slug);
        if !dir.join(METADATA_FILE).is_file() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| ServiceError::io(&dir, e))?;
        if let Some(public) = self.public_dir(slug) {
            if public.exists() {
                fs::remove_dir_all(&public).map_err(|e| ServiceError::io(&public, e))?;
            }
        }
        info!(slug = %slug, "Deleted article");
        Ok(true)
    }

    fn read_asset(&self, slug: &str, name: &str) -> Result<Option<Vec<u8>>> {
        if !is_valid_slug(slug) || !is_safe_file_name(name) {
            return Ok(None);
        }
        let path = self.article_dir(slug).join(ASSETS_DIR).join(name);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| ServiceError::io(&path, e))
    }

    fn write_asset(&self, slug: &str, name: &str, data: &[u8]) -> Result<()> {
        if !is_safe_file_name(name) {
            return Err(ServiceError::Validation(format!("invalid asset name '{}'", name)));
        }
        let _lock = self.acquire_write_lock()?;
        if self.load_one(slug)?.is_none() {
            return Err(ServiceError::NotFound(slug.to_string()));
        }

        let assets_dir = self.article_dir(slug).join(ASSETS_DIR);
        fs::create_dir_all(&assets_dir).map_err(|e| ServiceError::io(&assets_dir, e))?;
        write_atomic(&assets_dir.join(name), data)?;

        if let Some(public) = self.public_dir(slug) {
            fs::create_dir_all(&public).map_err(|e| ServiceError::io(&public, e))?;
            write_atomic(&public.join(name), data)?;
        }
        debug!(slug = %slug, asset = %name, "Wrote asset");
        Ok(())
    }

    /// Rebuilds `articles.json` from a directory scan
    fn reindex(&self) -> Result<()> {
        let entries: Vec<IndexEntry> = self
            .load_all()?
            .into_iter()
            .map(|a| IndexEntry {
                slug: a.slug,
                metadata: a.metadata,
            })
            .collect();
        let data = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.articles_path.join(INDEX_FILE), &data)?;
        debug!(count = entries.len(), "Rebuilt article index");
        Ok(())
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|e| ServiceError::io(path, e))
}

/// Writes through a sibling temp file and a rename
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    write_file(&tmp, data)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ServiceError::io(path, e)
    })
}
