//! Contentful adapter
//!
//! Reads list `entries?content_type=article`; writes go through the
//! management API with the entry's `X-Contentful-Version`. Field values may
//! arrive flat (delivery API) or as locale maps (management API); both are
//! accepted and `en-US` is used for writes.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};

use super::{bool_field, str_field, string_list, u32_field, CmsAdapter, CmsHttp, RemoteArticle};
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleMetadata, SeoMetadata};

const CONTENT_TYPE: &str = "article";
const LOCALE: &str = "en-US";
const PAGE_LIMIT: u64 = 1000;

pub struct ContentfulAdapter {
    http: CmsHttp,
    space: String,
    environment: String,
}

impl ContentfulAdapter {
    pub fn new(http: CmsHttp, space: String, environment: String) -> Self {
        Self {
            http,
            space,
            environment,
        }
    }

    fn entries_path(&self) -> String {
        format!("/spaces/{}/environments/{}/entries", self.space, self.environment)
    }

    fn entry_path(&self, id: &str) -> String {
        format!("{}/{}", self.entries_path(), id)
    }

    fn version_header(remote: &RemoteArticle) -> Result<Vec<(&'static str, String)>> {
        let version = remote.version.ok_or_else(|| {
            ServiceError::Unreachable(format!("entry {} has no sys.version", remote.id))
        })?;
        Ok(vec![("X-Contentful-Version", version.to_string())])
    }
}

/// Flattens `{"en-US": value}` locale maps down to the value
fn delocalize(fields: &Value) -> Value {
    let Some(map) = fields.as_object() else {
        return Value::Null;
    };
    let flat: Map<String, Value> = map
        .iter()
        .map(|(key, value)| {
            let value = match value.as_object() {
                Some(locales) if locales.contains_key(LOCALE) => locales[LOCALE].clone(),
                _ => value.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(flat)
}

/// Maps one entry (`{sys, fields}`) into an article
pub(crate) fn from_contentful(entry: &Value) -> RemoteArticle {
    let sys = entry.get("sys").cloned().unwrap_or(Value::Null);
    let fields = delocalize(entry.get("fields").unwrap_or(&Value::Null));

    let seo = SeoMetadata {
        meta_description: str_field(&fields, "metaDescription"),
        keywords: string_list(&fields, "keywords"),
    };

    let published = match fields.get("published").and_then(Value::as_bool) {
        Some(flag) => flag,
        // Delivery API only serves published entries and omits publishedVersion
        None => sys.get("publishedVersion").is_some() || sys.get("revision").is_some(),
    };

    let mut last_modified = str_field(&fields, "lastModified");
    if last_modified.is_empty() {
        last_modified = str_field(&sys, "updatedAt");
    }

    let article = Article {
        slug: str_field(&fields, "slug"),
        metadata: ArticleMetadata {
            title: str_field(&fields, "title"),
            summary: str_field(&fields, "summary"),
            author: str_field(&fields, "author"),
            publish_date: str_field(&fields, "publishDate"),
            last_modified,
            tags: string_list(&fields, "tags").into_iter().collect(),
            category: str_field(&fields, "category"),
            cover_image: str_field(&fields, "coverImage"),
            reading_time: u32_field(&fields, "readingTime"),
            featured: bool_field(&fields, "featured"),
            published,
            seo,
        },
        content: str_field(&fields, "content"),
        assets: Vec::new(),
    };

    RemoteArticle {
        id: str_field(&sys, "id"),
        version: sys.get("version").and_then(Value::as_i64),
        article,
    }
}

/// Management API body: every field wrapped in the default locale
pub(crate) fn to_contentful(article: &Article) -> Value {
    let meta = &article.metadata;
    let flat = json!({
        "title": meta.title,
        "slug": article.slug,
        "summary": meta.summary,
        "content": article.content,
        "author": meta.author,
        "publishDate": meta.publish_date,
        "lastModified": meta.last_modified,
        "tags": meta.tags,
        "category": meta.category,
        "coverImage": meta.cover_image,
        "readingTime": meta.reading_time,
        "featured": meta.featured,
        "published": meta.published,
        "metaDescription": meta.seo.meta_description,
        "keywords": meta.seo.keywords,
    });

    let mut fields = Map::new();
    if let Value::Object(map) = flat {
        for (key, value) in map {
            let mut localized = Map::new();
            localized.insert(LOCALE.to_string(), value);
            fields.insert(key, Value::Object(localized));
        }
    }
    json!({ "fields": fields })
}

fn items(body: &Value) -> Vec<Value> {
    body.get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl CmsAdapter for ContentfulAdapter {
    async fn list(&self) -> Result<Vec<Article>> {
        let path = self.entries_path();
        let limit = PAGE_LIMIT.to_string();
        let mut articles = Vec::new();
        let mut skip = 0u64;
        loop {
            let skip_param = skip.to_string();
            let body = self
                .http
                .get(
                    &path,
                    &[
                        ("content_type", CONTENT_TYPE),
                        ("limit", limit.as_str()),
                        ("skip", skip_param.as_str()),
                    ],
                )
                .await?
                .ok_or_else(|| ServiceError::Unreachable(format!("space {} not found", self.space)))?;

            let page = items(&body);
            articles.extend(page.iter().map(|e| from_contentful(e).article));

            let total = body.get("total").and_then(Value::as_u64).unwrap_or(0);
            skip += page.len() as u64;
            if page.is_empty() || skip >= total {
                break;
            }
        }
        Ok(articles)
    }

    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>> {
        let body = self
            .http
            .get(
                &self.entries_path(),
                &[
                    ("content_type", CONTENT_TYPE),
                    ("fields.slug", slug),
                    ("limit", "1"),
                ],
            )
            .await?;
        Ok(body.and_then(|b| items(&b).first().map(from_contentful)))
    }

    async fn create(&self, article: &Article) -> Result<()> {
        let headers = [("X-Contentful-Content-Type", CONTENT_TYPE.to_string())];
        self.http
            .send(Method::POST, &self.entries_path(), &to_contentful(article), &headers)
            .await?;
        Ok(())
    }

    async fn update(&self, remote: &RemoteArticle, article: &Article) -> Result<()> {
        let headers = Self::version_header(remote)?;
        self.http
            .send(Method::PUT, &self.entry_path(&remote.id), &to_contentful(article), &headers)
            .await?;
        Ok(())
    }

    async fn delete(&self, remote: &RemoteArticle) -> Result<()> {
        let headers = Self::version_header(remote)?;
        self.http.delete(&self.entry_path(&remote.id), &headers).await?;
        Ok(())
    }
}
