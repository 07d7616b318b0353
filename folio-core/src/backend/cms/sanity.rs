//! Sanity adapter
//!
//! `apiUrl` is the project's versioned API root, e.g.
//! `https://<projectId>.api.sanity.io/v2021-10-21`. Reads use the GROQ query
//! endpoint, writes the `mutate` endpoint.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use super::{bool_field, str_field, string_list, u32_field, CmsAdapter, CmsHttp, RemoteArticle};
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleMetadata, SeoMetadata};

const ALL_ARTICLES: &str = r#"*[_type == "article"]"#;
const ARTICLE_BY_SLUG: &str = r#"*[_type == "article" && slug.current == $slug][0]"#;

pub struct SanityAdapter {
    http: CmsHttp,
    dataset: String,
}

impl SanityAdapter {
    pub fn new(http: CmsHttp, dataset: String) -> Self {
        Self { http, dataset }
    }

    async fn query(&self, groq: &str, params: &[(&str, &str)]) -> Result<Value> {
        let path = format!("/data/query/{}", self.dataset);
        let mut query = vec![("query", groq)];
        query.extend_from_slice(params);
        let body = self
            .http
            .get(&path, &query)
            .await?
            .ok_or_else(|| ServiceError::Unreachable(format!("dataset {} not found", self.dataset)))?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn mutate(&self, mutation: Value) -> Result<()> {
        let path = format!("/data/mutate/{}", self.dataset);
        self.http
            .send(Method::POST, &path, &json!({ "mutations": [mutation] }), &[])
            .await?;
        Ok(())
    }
}

/// Maps one document into an article
pub(crate) fn from_sanity(doc: &Value) -> RemoteArticle {
    let slug = match doc.get("slug") {
        Some(Value::String(s)) => s.clone(),
        Some(slug) => str_field(slug, "current"),
        None => String::new(),
    };

    let seo = doc.get("seo").map_or_else(SeoMetadata::default, |seo| SeoMetadata {
        meta_description: str_field(seo, "metaDescription"),
        keywords: string_list(seo, "keywords"),
    });

    let mut publish_date = str_field(doc, "publishDate");
    if publish_date.is_empty() {
        publish_date = str_field(doc, "publishedAt");
    }

    let article = Article {
        slug,
        metadata: ArticleMetadata {
            title: str_field(doc, "title"),
            summary: str_field(doc, "summary"),
            author: str_field(doc, "author"),
            publish_date,
            last_modified: str_field(doc, "_updatedAt"),
            tags: string_list(doc, "tags").into_iter().collect(),
            category: str_field(doc, "category"),
            cover_image: str_field(doc, "coverImage"),
            reading_time: u32_field(doc, "readingTime"),
            featured: bool_field(doc, "featured"),
            published: bool_field(doc, "published"),
            seo,
        },
        content: str_field(doc, "content"),
        assets: Vec::new(),
    };

    RemoteArticle {
        id: str_field(doc, "_id"),
        version: None,
        article,
    }
}

/// Document fields for `create` and `patch.set`
pub(crate) fn to_sanity(article: &Article) -> Value {
    let meta = &article.metadata;
    json!({
        "title": meta.title,
        "slug": { "_type": "slug", "current": article.slug },
        "summary": meta.summary,
        "content": article.content,
        "author": meta.author,
        "publishDate": meta.publish_date,
        "tags": meta.tags,
        "category": meta.category,
        "coverImage": meta.cover_image,
        "readingTime": meta.reading_time,
        "featured": meta.featured,
        "published": meta.published,
        "seo": {
            "metaDescription": meta.seo.meta_description,
            "keywords": meta.seo.keywords,
        },
    })
}

#[async_trait]
impl CmsAdapter for SanityAdapter {
    async fn list(&self) -> Result<Vec<Article>> {
        let result = self.query(ALL_ARTICLES, &[]).await?;
        Ok(result
            .as_array()
            .map(|docs| docs.iter().map(|d| from_sanity(d).article).collect())
            .unwrap_or_default())
    }

    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>> {
        // GROQ parameters are JSON literals
        let param = Value::String(slug.to_string()).to_string();
        let result = self.query(ARTICLE_BY_SLUG, &[("$slug", param.as_str())]).await?;
        Ok(match result {
            Value::Null => None,
            doc => Some(from_sanity(&doc)),
        })
    }

    async fn create(&self, article: &Article) -> Result<()> {
        let mut doc = to_sanity(article);
        doc["_type"] = json!("article");
        self.mutate(json!({ "create": doc })).await
    }

    async fn update(&self, remote: &RemoteArticle, article: &Article) -> Result<()> {
        self.mutate(json!({ "patch": { "id": remote.id, "set": to_sanity(article) } }))
            .await
    }

    async fn delete(&self, remote: &RemoteArticle) -> Result<()> {
        self.mutate(json!({ "delete": { "id": remote.id } })).await
    }
}
