//! Article backend abstraction traits
//!
//! This module defines the capability trait every storage backend implements.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::archive::{self, BundleAsset};
use crate::config::BackendType;
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleUpdate, BulkDeleteResult, ImportedArticle};

/// Renders an article to PDF. Implemented outside this crate (for example by
/// a headless browser); backends only look the article up and delegate.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, article: &Article) -> Result<Vec<u8>>;
}

/// Core trait for article backends
///
/// The design philosophy is:
/// - Each backend implements the five CRUD primitives against its own store
/// - Queries, bulk operations and ZIP import/export have default versions
///   built on those primitives; backends override them when they can do better
/// - Expected failures (not found, duplicate slug, bad input) are typed
///   [`ServiceError`] variants rather than panics
#[async_trait]
pub trait ArticleService: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Short description for logs; must not contain credentials
    fn describe(&self) -> String {
        self.backend_type().to_string()
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Lists every article, newest publish date first
    async fn get_all_articles(&self) -> Result<Vec<Article>>;

    /// Gets an article by slug; `None` when it does not exist
    async fn get_article(&self, slug: &str) -> Result<Option<Article>>;

    /// Creates a new article. Fails with `Conflict` if the slug is taken
    /// and with `Validation` if slug or title are missing.
    async fn create_article(&self, article: &Article) -> Result<()>;

    /// Merges an update onto an existing article. Fails with `NotFound`
    /// if the slug does not exist.
    async fn update_article(&self, slug: &str, update: &ArticleUpdate) -> Result<()>;

    /// Deletes an article; returns false when there was nothing to delete
    async fn delete_article(&self, slug: &str) -> Result<bool>;

    /// Deletes each slug independently, in input order
    async fn bulk_delete_articles(&self, slugs: &[String]) -> BulkDeleteResult {
        let mut result = BulkDeleteResult::default();
        for slug in slugs {
            match self.delete_article(slug).await {
                Ok(true) => result.success.push(slug.clone()),
                Ok(false) => {
                    debug!(slug = %slug, "Nothing to delete");
                    result.failed.push(slug.clone());
                }
                Err(e) => {
                    warn!(slug = %slug, error = %e, "Failed to delete article");
                    result.failed.push(slug.clone());
                }
            }
        }
        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Case-insensitive search over title, summary, tags and category
    async fn search_articles(&self, query: &str) -> Result<Vec<Article>> {
        let articles = self.get_all_articles().await?;
        Ok(articles
            .into_iter()
            .filter(|a| a.matches_query(query))
            .collect())
    }

    /// Articles carrying exactly this tag
    async fn get_articles_by_tag(&self, tag: &str) -> Result<Vec<Article>> {
        let articles = self.get_all_articles().await?;
        Ok(articles
            .into_iter()
            .filter(|a| a.metadata.tags.contains(tag))
            .collect())
    }

    /// Articles in exactly this category
    async fn get_articles_by_category(&self, category: &str) -> Result<Vec<Article>> {
        let articles = self.get_all_articles().await?;
        Ok(articles
            .into_iter()
            .filter(|a| a.metadata.category == category)
            .collect())
    }

    async fn get_featured_articles(&self) -> Result<Vec<Article>> {
        let articles = self.get_all_articles().await?;
        Ok(articles
            .into_iter()
            .filter(|a| a.metadata.featured)
            .collect())
    }

    // =========================================================================
    // Assets
    // =========================================================================

    /// Reads one asset file of an article
    async fn read_asset(&self, _slug: &str, _name: &str) -> Result<Option<Vec<u8>>> {
        Err(ServiceError::Unsupported(format!(
            "{} backend does not store assets",
            self.backend_type()
        )))
    }

    /// Writes one asset file of an existing article
    async fn write_asset(&self, _slug: &str, _name: &str, _data: &[u8]) -> Result<()> {
        Err(ServiceError::Unsupported(format!(
            "{} backend does not store assets",
            self.backend_type()
        )))
    }

    // =========================================================================
    // Import / Export
    // =========================================================================

    /// Imports every well-formed bundle of a ZIP archive. Malformed
    /// bundles and duplicate slugs are logged and skipped.
    async fn upload_from_zip(&self, data: &[u8]) -> Result<Vec<ImportedArticle>> {
        let data = data.to_vec();
        let bundles = tokio::task::spawn_blocking(move || archive::read_bundles(&data)).await??;

        let mut imported = Vec::new();
        for bundle in bundles {
            let label = bundle.label();
            let parsed = match bundle.into_article() {
                Ok(parsed) => parsed,
                Err(reason) => {
                    warn!(bundle = %label, reason = %reason, "Skipping malformed archive entry");
                    continue;
                }
            };

            let slug = parsed.article.slug.clone();
            if let Err(e) = self.create_article(&parsed.article).await {
                warn!(bundle = %label, slug = %slug, error = %e, "Skipping archive entry");
                continue;
            }
            for asset in &parsed.assets {
                if let Err(e) = self.write_asset(&slug, &asset.name, &asset.data).await {
                    warn!(slug = %slug, asset = %asset.name, error = %e, "Failed to import asset");
                }
            }
            debug!(slug = %slug, "Imported article from archive");
            imported.push(ImportedArticle {
                slug,
                title: parsed.declared_title,
            });
        }
        Ok(imported)
    }

    /// Exports the given articles (all when `slugs` is empty) as a ZIP
    /// archive with one directory per slug
    async fn export_as_zip(&self, slugs: &[String]) -> Result<Vec<u8>> {
        let articles = if slugs.is_empty() {
            self.get_all_articles().await?
        } else {
            let mut articles = Vec::with_capacity(slugs.len());
            for slug in slugs {
                let article = self
                    .get_article(slug)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(slug.clone()))?;
                articles.push(article);
            }
            articles
        };

        let mut entries = Vec::with_capacity(articles.len());
        for article in articles {
            let mut assets = Vec::new();
            for name in &article.assets {
                match self.read_asset(&article.slug, name).await {
                    Ok(Some(data)) => assets.push(BundleAsset {
                        name: name.clone(),
                        data,
                    }),
                    Ok(None) => {
                        warn!(slug = %article.slug, asset = %name, "Asset listed but missing")
                    }
                    Err(ServiceError::Unsupported(_)) => break,
                    Err(e) => {
                        warn!(slug = %article.slug, asset = %name, error = %e, "Failed to read asset")
                    }
                }
            }
            entries.push((article, assets));
        }

        let bytes = tokio::task::spawn_blocking(move || archive::write_archive(&entries)).await??;
        Ok(bytes)
    }

    /// Renders an article to PDF through an external renderer
    async fn generate_pdf(&self, slug: &str, renderer: &dyn PdfRenderer) -> Result<Vec<u8>> {
        let article = self
            .get_article(slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(slug.to_string()))?;
        renderer.render(&article).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Releases connections held by the backend. Called before a replaced
    /// backend is dropped.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
