//! Strapi v4 REST adapter (`/api/articles`)

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::{bool_field, names_field, str_field, u32_field, CmsAdapter, CmsHttp, RemoteArticle};
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleMetadata, SeoMetadata};

const COLLECTION: &str = "/api/articles";
const PAGE_SIZE: &str = "100";

pub struct StrapiAdapter {
    http: CmsHttp,
}

impl StrapiAdapter {
    pub fn new(http: CmsHttp) -> Self {
        Self { http }
    }
}

/// Name of a relation (`{data: {attributes: {name}}}`) or a plain string
fn relation_name(attrs: &Value, key: &str) -> String {
    match attrs.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value
            .pointer("/data/attributes/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        None => String::new(),
    }
}

/// Maps one `data[]` entry into an article plus its numeric id
pub(crate) fn from_strapi(entry: &Value) -> RemoteArticle {
    let empty = Value::Null;
    let attrs = entry.get("attributes").unwrap_or(&empty);

    let tags: BTreeSet<String> = match attrs.get("tags").and_then(|t| t.get("data")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.pointer("/attributes/name").and_then(Value::as_str))
            .map(String::from)
            .collect(),
        _ => names_field(attrs, "tags", "name"),
    };

    let seo = attrs.get("seo").map_or_else(SeoMetadata::default, |seo| SeoMetadata {
        meta_description: str_field(seo, "metaDescription"),
        keywords: match seo.get("keywords") {
            Some(Value::String(s)) => s
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            _ => names_field(seo, "keywords", "name").into_iter().collect(),
        },
    });

    let article = Article {
        slug: str_field(attrs, "slug"),
        metadata: ArticleMetadata {
            title: str_field(attrs, "title"),
            summary: str_field(attrs, "summary"),
            author: relation_name(attrs, "author"),
            publish_date: str_field(attrs, "publishedDate"),
            last_modified: str_field(attrs, "updatedAt"),
            tags,
            category: relation_name(attrs, "category"),
            cover_image: str_field(attrs, "coverImage"),
            reading_time: u32_field(attrs, "readingTime"),
            featured: bool_field(attrs, "featured"),
            published: attrs.get("publishedAt").is_some_and(|p| !p.is_null()),
            seo,
        },
        content: str_field(attrs, "content"),
        assets: Vec::new(),
    };

    RemoteArticle {
        id: str_field(entry, "id"),
        version: None,
        article,
    }
}

/// Request body for create and update
pub(crate) fn to_strapi(article: &Article) -> Value {
    let meta = &article.metadata;
    let published_at = if meta.published {
        let at = meta
            .published_at()
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        Value::String(at)
    } else {
        Value::Null
    };
    json!({
        "data": {
            "title": meta.title,
            "slug": article.slug,
            "summary": meta.summary,
            "content": article.content,
            "author": meta.author,
            "publishedDate": meta.publish_date,
            "tags": meta.tags,
            "category": meta.category,
            "coverImage": meta.cover_image,
            "readingTime": meta.reading_time,
            "featured": meta.featured,
            "publishedAt": published_at,
            "seo": {
                "metaDescription": meta.seo.meta_description,
                "keywords": meta.seo.keywords.join(", "),
            },
        }
    })
}

fn entries(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl CmsAdapter for StrapiAdapter {
    async fn list(&self) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        let mut page = 1u64;
        loop {
            let page_param = page.to_string();
            let body = self
                .http
                .get(
                    COLLECTION,
                    &[
                        ("populate", "*"),
                        ("publicationState", "preview"),
                        ("pagination[page]", page_param.as_str()),
                        ("pagination[pageSize]", PAGE_SIZE),
                    ],
                )
                .await?
                .ok_or_else(|| ServiceError::Unreachable(format!("{} not found", COLLECTION)))?;

            articles.extend(entries(&body).iter().map(|e| from_strapi(e).article));

            let page_count = body
                .pointer("/meta/pagination/pageCount")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            if page >= page_count {
                break;
            }
            page += 1;
        }
        Ok(articles)
    }

    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>> {
        let body = self
            .http
            .get(
                COLLECTION,
                &[
                    ("filters[slug][$eq]", slug),
                    ("populate", "*"),
                    ("publicationState", "preview"),
                ],
            )
            .await?;
        Ok(body.and_then(|b| entries(&b).first().map(from_strapi)))
    }

    async fn create(&self, article: &Article) -> Result<()> {
        self.http
            .send(Method::POST, COLLECTION, &to_strapi(article), &[])
            .await?;
        Ok(())
    }

    async fn update(&self, remote: &RemoteArticle, article: &Article) -> Result<()> {
        let path = format!("{}/{}", COLLECTION, remote.id);
        self.http
            .send(Method::PUT, &path, &to_strapi(article), &[])
            .await?;
        Ok(())
    }

    async fn delete(&self, remote: &RemoteArticle) -> Result<()> {
        let path = format!("{}/{}", COLLECTION, remote.id);
        self.http.delete(&path, &[]).await?;
        Ok(())
    }
}
