//! Ghost Content API adapter (read-only)
//!
//! Writing requires the Admin API, which authenticates with short-lived
//! JWTs signed from an admin key. That is not supported; writes fail with
//! `Unsupported`.

use async_trait::async_trait;
use serde_json::Value;

use super::{bool_field, names_field, str_field, u32_field, CmsAdapter, CmsHttp, RemoteArticle};
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleMetadata, SeoMetadata};

const POSTS: &str = "/ghost/api/content/posts";
const INCLUDE: &str = "tags,authors";

pub struct GhostAdapter {
    http: CmsHttp,
    content_key: String,
}

impl GhostAdapter {
    pub fn new(http: CmsHttp, content_key: String) -> Self {
        Self { http, content_key }
    }

    fn read_only() -> ServiceError {
        ServiceError::Unsupported("Ghost backend is read-only (Content API)".to_string())
    }
}

/// Maps one post into an article
pub(crate) fn from_ghost(post: &Value) -> RemoteArticle {
    let mut summary = str_field(post, "custom_excerpt");
    if summary.is_empty() {
        summary = str_field(post, "excerpt");
    }

    let mut content = str_field(post, "html");
    if content.is_empty() {
        content = str_field(post, "plaintext");
    }

    let author = post
        .get("primary_author")
        .map(|a| str_field(a, "name"))
        .unwrap_or_default();
    let category = post
        .get("primary_tag")
        .map(|t| str_field(t, "name"))
        .unwrap_or_default();

    let article = Article {
        slug: str_field(post, "slug"),
        metadata: ArticleMetadata {
            title: str_field(post, "title"),
            summary,
            author,
            publish_date: str_field(post, "published_at"),
            last_modified: str_field(post, "updated_at"),
            tags: names_field(post, "tags", "name"),
            category,
            cover_image: str_field(post, "feature_image"),
            reading_time: u32_field(post, "reading_time"),
            featured: bool_field(post, "featured"),
            // The Content API only serves published posts
            published: true,
            seo: SeoMetadata {
                meta_description: str_field(post, "meta_description"),
                keywords: Vec::new(),
            },
        },
        content,
        assets: Vec::new(),
    };

    RemoteArticle {
        id: str_field(post, "id"),
        version: None,
        article,
    }
}

fn posts(body: &Value) -> Vec<Value> {
    body.get("posts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl CmsAdapter for GhostAdapter {
    async fn list(&self) -> Result<Vec<Article>> {
        let path = format!("{}/", POSTS);
        let body = self
            .http
            .get(
                &path,
                &[
                    ("key", self.content_key.as_str()),
                    ("limit", "all"),
                    ("include", INCLUDE),
                    ("formats", "html,plaintext"),
                ],
            )
            .await?
            .ok_or_else(|| ServiceError::Unreachable(format!("{} not found", POSTS)))?;
        Ok(posts(&body).iter().map(|p| from_ghost(p).article).collect())
    }

    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>> {
        let path = format!("{}/slug/{}/", POSTS, slug);
        let body = self
            .http
            .get(
                &path,
                &[
                    ("key", self.content_key.as_str()),
                    ("include", INCLUDE),
                    ("formats", "html,plaintext"),
                ],
            )
            .await?;
        Ok(body.and_then(|b| posts(&b).first().map(from_ghost)))
    }

    async fn create(&self, _article: &Article) -> Result<()> {
        Err(Self::read_only())
    }

    async fn update(&self, _remote: &RemoteArticle, _article: &Article) -> Result<()> {
        Err(Self::read_only())
    }

    async fn delete(&self, _remote: &RemoteArticle) -> Result<()> {
        Err(Self::read_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_maps_post() {
        let post = json!({
            "id": "5ddc9141c35e7700383b2937",
            "slug": "welcome",
            "title": "Welcome",
            "html": "<p>Hi</p>",
            "custom_excerpt": null,
            "excerpt": "Hi",
            "feature_image": "https://img.example.com/w.png",
            "featured": false,
            "published_at": "2024-01-02T03:04:05.000+00:00",
            "updated_at": "2024-01-03T03:04:05.000+00:00",
            "reading_time": 1,
            "tags": [{"name": "Getting Started"}, {"name": "News"}],
            "primary_tag": {"name": "Getting Started"},
            "primary_author": {"name": "Ghost"},
        });
        let a = from_ghost(&post).article;
        assert_eq!(a.slug, "welcome");
        assert_eq!(a.metadata.summary, "Hi");
        assert_eq!(a.metadata.category, "Getting Started");
        assert_eq!(a.metadata.author, "Ghost");
        assert_eq!(a.metadata.tags.len(), 2);
        assert_eq!(a.metadata.cover_image, "https://img.example.com/w.png");
        assert!(a.metadata.published);
        assert_eq!(a.content, "<p>Hi</p>");
    }

    #[test]
    fn test_missing_fields_default() {
        let a = from_ghost(&json!({"slug": "bare", "plaintext": "text"})).article;
        assert_eq!(a.content, "text");
        assert!(a.metadata.author.is_empty());
        assert_eq!(a.metadata.reading_time, 0);
    }

    #[tokio::test]
    async fn test_writes_are_unsupported() {
        let adapter = GhostAdapter::new(CmsHttp::new("http://127.0.0.1:1", "").unwrap(), String::new());
        assert!(matches!(
            adapter.create(&Article::new("a", "A", "")).await,
            Err(ServiceError::Unsupported(_))
        ));
    }
}
