//! Canonical article model shared by every backend
//!
//! Field names serialize in camelCase so `metadata.json` files, ZIP bundles
//! and the custom CMS wire format all agree on one shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// SEO block attached to every article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeoMetadata {
    pub meta_description: String,
    pub keywords: Vec<String>,
}

/// Article metadata. Every field is always populated; missing input
/// fields fall back to their empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleMetadata {
    pub title: String,
    pub summary: String,
    pub author: String,
    pub publish_date: String,
    /// Empty when the article was never modified after publication
    pub last_modified: String,
    pub tags: BTreeSet<String>,
    pub category: String,
    pub cover_image: String,
    /// Estimated reading time in minutes
    pub reading_time: u32,
    pub featured: bool,
    pub published: bool,
    pub seo: SeoMetadata,
}

impl ArticleMetadata {
    /// Creates metadata with only a title set
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Parsed publish date, if present and well formed
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.publish_date)
    }

    /// The timestamp sync compares: `lastModified`, falling back to
    /// `publishDate` when the former is absent
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        if self.last_modified.trim().is_empty() {
            self.published_at()
        } else {
            parse_timestamp(&self.last_modified)
        }
    }

    /// Applies a partial update in place
    pub fn apply(&mut self, patch: &MetadataPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(summary) = &patch.summary {
            self.summary = summary.clone();
        }
        if let Some(author) = &patch.author {
            self.author = author.clone();
        }
        if let Some(publish_date) = &patch.publish_date {
            self.publish_date = publish_date.clone();
        }
        if let Some(last_modified) = &patch.last_modified {
            self.last_modified = last_modified.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(cover_image) = &patch.cover_image {
            self.cover_image = cover_image.clone();
        }
        if let Some(reading_time) = patch.reading_time {
            self.reading_time = reading_time;
        }
        if let Some(featured) = patch.featured {
            self.featured = featured;
        }
        if let Some(published) = patch.published {
            self.published = published;
        }
        if let Some(seo) = &patch.seo {
            self.seo = seo.clone();
        }
    }
}

/// Partial metadata used by updates; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub publish_date: Option<String>,
    pub last_modified: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub category: Option<String>,
    pub cover_image: Option<String>,
    pub reading_time: Option<u32>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
    pub seo: Option<SeoMetadata>,
}

impl From<&ArticleMetadata> for MetadataPatch {
    /// A patch that overwrites every field, used when syncing whole records
    fn from(meta: &ArticleMetadata) -> Self {
        Self {
            title: Some(meta.title.clone()),
            summary: Some(meta.summary.clone()),
            author: Some(meta.author.clone()),
            publish_date: Some(meta.publish_date.clone()),
            last_modified: Some(meta.last_modified.clone()),
            tags: Some(meta.tags.clone()),
            category: Some(meta.category.clone()),
            cover_image: Some(meta.cover_image.clone()),
            reading_time: Some(meta.reading_time),
            featured: Some(meta.featured),
            published: Some(meta.published),
            seo: Some(meta.seo.clone()),
        }
    }
}

/// The unit of content: slug + metadata + Markdown body + asset names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub slug: String,
    pub metadata: ArticleMetadata,
    pub content: String,
    /// Asset file names, relative to the article's asset directory
    pub assets: Vec<String>,
}

impl Article {
    pub fn new(slug: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            metadata: ArticleMetadata::new(title),
            content: content.into(),
            assets: Vec::new(),
        }
    }

    /// Checks the fields every backend requires before a create
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_slug(&self.slug) {
            return Err(format!("invalid slug '{}'", self.slug));
        }
        if self.metadata.title.trim().is_empty() {
            return Err(format!("article '{}' has no title", self.slug));
        }
        Ok(())
    }

    /// Case-insensitive substring match over title, summary, tags and category.
    /// A blank query matches everything.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let meta = &self.metadata;
        meta.title.to_lowercase().contains(&needle)
            || meta.summary.to_lowercase().contains(&needle)
            || meta.category.to_lowercase().contains(&needle)
            || meta.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    /// Applies an update, stamping `lastModified` unless the update sets it
    pub fn apply_update(&mut self, update: &ArticleUpdate) {
        if let Some(patch) = &update.metadata {
            self.metadata.apply(patch);
        }
        if let Some(content) = &update.content {
            self.content = content.clone();
        }
        if let Some(assets) = &update.assets {
            self.assets = assets.clone();
        }
        let sets_last_modified = update
            .metadata
            .as_ref()
            .is_some_and(|m| m.last_modified.is_some());
        if !sets_last_modified {
            self.metadata.last_modified = Utc::now().to_rfc3339();
        }
    }
}

/// Partial article update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleUpdate {
    pub metadata: Option<MetadataPatch>,
    pub content: Option<String>,
    pub assets: Option<Vec<String>>,
}

impl ArticleUpdate {
    /// An update that makes the target record identical to `article`
    pub fn replace_with(article: &Article) -> Self {
        Self {
            metadata: Some(MetadataPatch::from(&article.metadata)),
            content: Some(article.content.clone()),
            assets: Some(article.assets.clone()),
        }
    }
}

/// Outcome of a bulk delete; slugs keep their input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteResult {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

/// One article created by a ZIP import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedArticle {
    pub slug: String,
    pub title: Option<String>,
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Presentation order: newest publish date first, undated last, ties by slug
pub fn compare_by_publish_date(a: &Article, b: &Article) -> Ordering {
    match (a.metadata.published_at(), b.metadata.published_at()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.slug.cmp(&b.slug))
}

/// Sorts articles in presentation order
pub fn sort_articles(articles: &mut [Article]) {
    articles.sort_by(compare_by_publish_date);
}

/// URL-safe: non-empty, ASCII alphanumerics, `-` and `_` only
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Derives a slug from free text, e.g. a title
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("React Hooks Explained"), "react-hooks-explained");
        assert_eq!(slugify("  Rust & WebAssembly: 2024!  "), "rust-webassembly-2024");
        assert_eq!(slugify("---"), "");
        assert!(is_valid_slug(&slugify("Hello, World")));
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("my-post_2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("../etc"));
        assert!(!is_valid_slug("with space"));
    }

    #[test]
    fn test_metadata_defaults_from_sparse_json() {
        let meta: ArticleMetadata = serde_json::from_str(r#"{"title":"Only a title"}"#).unwrap();
        assert_eq!(meta.title, "Only a title");
        assert_eq!(meta.summary, "");
        assert!(meta.tags.is_empty());
        assert!(!meta.featured);
        assert_eq!(meta.seo, SeoMetadata::default());
    }

    #[test]
    fn test_metadata_uses_canonical_keys() {
        let mut meta = ArticleMetadata::new("T");
        meta.publish_date = "2024-01-02".to_string();
        meta.reading_time = 4;
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["publishDate"], "2024-01-02");
        assert_eq!(json["readingTime"], 4);
        assert!(json.get("lastModified").is_some());
        assert!(json["seo"].get("metaDescription").is_some());
    }

    #[test]
    fn test_modified_at_falls_back_to_publish_date() {
        let mut meta = ArticleMetadata::new("T");
        meta.publish_date = "2024-03-01".to_string();
        assert_eq!(meta.modified_at(), parse_timestamp("2024-03-01"));

        meta.last_modified = "2024-03-05T10:00:00Z".to_string();
        assert_eq!(meta.modified_at(), parse_timestamp("2024-03-05T10:00:00Z"));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut article = Article::new("react-hooks", "React Hooks Explained", "body");
        article.metadata.tags.insert("Frontend".to_string());
        assert!(article.matches_query("REACT"));
        assert!(article.matches_query("react"));
        assert!(article.matches_query("frontend"));
        assert!(article.matches_query("   "));
        assert!(!article.matches_query("rust"));
    }

    #[test]
    fn test_apply_update_stamps_last_modified() {
        let mut article = Article::new("a", "Old", "body");
        article.apply_update(&ArticleUpdate {
            metadata: Some(MetadataPatch {
                title: Some("New".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(article.metadata.title, "New");
        assert_eq!(article.content, "body");
        assert!(parse_timestamp(&article.metadata.last_modified).is_some());
    }

    #[test]
    fn test_replace_with_preserves_timestamps() {
        let mut source = Article::new("a", "Source", "new body");
        source.metadata.last_modified = "2024-05-01T00:00:00Z".to_string();
        let mut target = Article::new("a", "Target", "old body");
        target.apply_update(&ArticleUpdate::replace_with(&source));
        assert_eq!(target, source);
    }

    #[test]
    fn test_sort_newest_first() {
        let mut a = Article::new("a", "A", "");
        a.metadata.publish_date = "2023-01-01".to_string();
        let mut b = Article::new("b", "B", "");
        b.metadata.publish_date = "2024-01-01".to_string();
        let c = Article::new("c", "C", "");
        let mut articles = vec![c, a, b];
        sort_articles(&mut articles);
        let slugs: Vec<_> = articles.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, ["b", "a", "c"]);
    }
}
