//! Adapter for custom REST APIs speaking the canonical article JSON
//!
//! `GET /articles`, `GET /articles/{slug}`, `POST /articles`,
//! `PUT /articles/{slug}`, `DELETE /articles/{slug}`.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::warn;

use super::{CmsAdapter, CmsHttp, RemoteArticle};
use crate::error::{Result, ServiceError};
use crate::models::Article;

const COLLECTION: &str = "/articles";

pub struct CustomAdapter {
    http: CmsHttp,
}

impl CustomAdapter {
    pub fn new(http: CmsHttp) -> Self {
        Self { http }
    }
}

/// Accepts either a bare array or `{ "articles": [...] }`. Records that do
/// not decode are skipped with a warning.
pub(crate) fn parse_list(body: &Value) -> Vec<Article> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        other => other
            .get("articles")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Article>(item.clone()) {
            Ok(article) => Some(article),
            Err(e) => {
                warn!(error = %e, "Skipping malformed article record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl CmsAdapter for CustomAdapter {
    async fn list(&self) -> Result<Vec<Article>> {
        let body = self
            .http
            .get(COLLECTION, &[])
            .await?
            .ok_or_else(|| ServiceError::Unreachable(format!("{} not found", COLLECTION)))?;
        Ok(parse_list(&body))
    }

    async fn find(&self, slug: &str) -> Result<Option<RemoteArticle>> {
        let path = format!("{}/{}", COLLECTION, slug);
        match self.http.get(&path, &[]).await? {
            Some(body) => {
                let article: Article = serde_json::from_value(body)?;
                Ok(Some(RemoteArticle {
                    id: article.slug.clone(),
                    version: None,
                    article,
                }))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, article: &Article) -> Result<()> {
        let body = serde_json::to_value(article)?;
        self.http.send(Method::POST, COLLECTION, &body, &[]).await?;
        Ok(())
    }

    async fn update(&self, remote: &RemoteArticle, article: &Article) -> Result<()> {
        let path = format!("{}/{}", COLLECTION, remote.id);
        let body = serde_json::to_value(article)?;
        self.http.send(Method::PUT, &path, &body, &[]).await?;
        Ok(())
    }

    async fn delete(&self, remote: &RemoteArticle) -> Result<()> {
        let path = format!("{}/{}", COLLECTION, remote.id);
        self.http.delete(&path, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_both_list_shapes() {
        let record = json!({"slug": "a", "metadata": {"title": "A"}, "content": "x"});
        assert_eq!(parse_list(&json!([record.clone()])).len(), 1);
        assert_eq!(parse_list(&json!({"articles": [record]})).len(), 1);
        assert!(parse_list(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn test_partial_records_get_defaults_and_bad_ones_are_skipped() {
        let body = json!([
            {"slug": "partial", "metadata": {"title": "Partial"}},
            {"slug": 5},
        ]);
        let articles = parse_list(&body);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].slug, "partial");
        assert!(articles[0].content.is_empty());
        assert!(articles[0].metadata.tags.is_empty());
    }
}
