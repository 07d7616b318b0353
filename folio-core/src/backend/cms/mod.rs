//! Headless CMS article backend
//!
//! [`CmsBackend`] implements [`ArticleService`] on top of a per-product
//! [`CmsAdapter`], which translates between the product's record shape and
//! the canonical [`Article`]. Fields a product does not return are filled
//! with their empty defaults.

mod client;
mod contentful;
mod custom;
mod ghost;
mod sanity;
mod strapi;

pub use client::CmsHttp;
pub use contentful::ContentfulAdapter;
pub use custom::CustomAdapter;
pub use ghost::GhostAdapter;
pub use sanity::SanityAdapter;
pub use strapi::StrapiAdapter;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::traits::ArticleService;
use crate::config::{BackendType, CmsConfig, CmsKind};
use crate::error::{Result, ServiceError};
use crate::models::{is_valid_slug, sort_articles, Article, ArticleUpdate};

/// An article as stored remotely, with the handle needed to change it
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteArticle {
    /// Product-specific record id
    pub id: String,
    /// Optimistic-locking version, for products that require one
    pub version: Option<i64>,
    pub article: Article,
}

/// Product-specific translation layer used by [`CmsBackend`]
#[async_trait]
pub trait CmsAdapter: Send + Sync {
    /// Lists every article record
    async fn list(&self) -> Result<Vec<Article>>;

    /// Looks one record up by slug
    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>>;

    async fn create(&self, article: &Article) -> Result<()>;

    /// Overwrites `remote` with the merged `article`
    async fn update(&self, remote: &RemoteArticle, article: &Article) -> Result<()>;

    async fn delete(&self, remote: &RemoteArticle) -> Result<()>;
}

/// CMS backend implementation
pub struct CmsBackend {
    kind: CmsKind,
    api_url: String,
    adapter: Box<dyn CmsAdapter>,
}

impl CmsBackend {
    /// Builds the HTTP client and the adapter for `config.kind`. No request
    /// is made until the first operation.
    pub fn new(config: &CmsConfig) -> Result<Self> {
        let http = CmsHttp::new(&config.api_url, &config.api_key)?;
        let adapter: Box<dyn CmsAdapter> = match config.kind {
            CmsKind::Strapi => Box::new(StrapiAdapter::new(http)),
            CmsKind::Contentful => {
                let space = config.space_id.clone().unwrap_or_default();
                let environment = config
                    .environment
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "master".to_string());
                Box::new(ContentfulAdapter::new(http, space, environment))
            }
            CmsKind::Sanity => {
                Box::new(SanityAdapter::new(http, config.dataset.clone().unwrap_or_default()))
            }
            // Ghost's Content API authenticates with a `key` query parameter
            CmsKind::Ghost => Box::new(GhostAdapter::new(
                CmsHttp::new(&config.api_url, "")?,
                config.api_key.clone(),
            )),
            CmsKind::Custom => Box::new(CustomAdapter::new(http)),
        };
        info!(cms = %config.kind, url = %config.api_url, "Configured CMS backend");
        Ok(Self::with_adapter(config.kind, config.api_url.clone(), adapter))
    }

    /// Wraps an existing adapter
    pub fn with_adapter(kind: CmsKind, api_url: String, adapter: Box<dyn CmsAdapter>) -> Self {
        Self {
            kind,
            api_url,
            adapter,
        }
    }

    pub fn kind(&self) -> CmsKind {
        self.kind
    }
}

#[async_trait]
impl ArticleService for CmsBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Cms
    }

    fn describe(&self) -> String {
        format!("{} CMS ({})", self.kind, self.api_url)
    }

    async fn get_all_articles(&self) -> Result<Vec<Article>> {
        let mut articles = self.adapter.list().await?;
        sort_articles(&mut articles);
        Ok(articles)
    }

    async fn get_article(&self, slug: &str) -> Result<Option<Article>> {
        if !is_valid_slug(slug) {
            return Ok(None);
        }
        Ok(self.adapter.find(slug).await?.map(|r| r.article))
    }

    async fn create_article(&self, article: &Article) -> Result<()> {
        article.validate().map_err(ServiceError::Validation)?;
        if self.adapter.find(&article.slug).await?.is_some() {
            return Err(ServiceError::Conflict(article.slug.clone()));
        }
        self.adapter.create(article).await?;
        debug!(cms = %self.kind, slug = %article.slug, "Created CMS article");
        Ok(())
    }

    async fn update_article(&self, slug: &str, update: &ArticleUpdate) -> Result<()> {
        let remote = match is_valid_slug(slug) {
            true => self.adapter.find(slug).await?,
            false => None,
        }
        .ok_or_else(|| ServiceError::NotFound(slug.to_string()))?;

        let mut article = remote.article.clone();
        article.apply_update(update);
        self.adapter.update(&remote, &article).await
    }

    async fn delete_article(&self, slug: &str) -> Result<bool> {
        if !is_valid_slug(slug) {
            return Ok(false);
        }
        match self.adapter.find(slug).await? {
            Some(remote) => {
                self.adapter.delete(&remote).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Field helpers shared by the adapters
// ============================================================================

/// String field; numbers are stringified, anything else is empty
pub(crate) fn str_field(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn bool_field(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Non-negative integer field, saturating at `u32::MAX`
pub(crate) fn u32_field(record: &Value, key: &str) -> u32 {
    record
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// Names out of an array of strings or of objects carrying `name_key`
pub(crate) fn names_field(record: &Value, key: &str, name_key: &str) -> BTreeSet<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => item.get(name_key).and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn string_list(record: &Value, key: &str) -> Vec<String> {
    names_field(record, key, "name").into_iter().collect()
}
