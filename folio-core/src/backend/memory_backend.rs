use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::traits::ArticleService;
use crate::archive::is_safe_file_name;
use crate::config::BackendType;
use crate::error::{Result, ServiceError};
use crate::models::{sort_articles, Article, ArticleUpdate};

#[derive(Default)]
struct MemoryState {
    articles: BTreeMap<String, Article>,
    assets: HashMap<(String, String), Vec<u8>>,
    failing_deletes: HashSet<String>,
    fail_reads: bool,
}

/// In-memory article backend.
///
/// Nothing is persisted. Serves as a scratch sync target and as the test
/// double for backend manager behavior; failures can be simulated per slug.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-filled with articles
    pub fn with_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.lock();
            for article in articles {
                state.articles.insert(article.slug.clone(), article);
            }
        }
        backend
    }

    /// Makes every delete of `slug` fail with a simulated backend error
    pub fn fail_deletes_for(&self, slug: &str) {
        self.lock().failing_deletes.insert(slug.to_string());
    }

    /// Makes list and lookup calls fail, as an unreachable backend would
    pub fn set_simulate_unreachable(&self, unreachable: bool) {
        self.lock().fail_reads = unreachable;
    }

    /// Number of stored articles
    pub fn len(&self) -> usize {
        self.lock().articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-write;
        // the maps themselves are still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(state: &MemoryState) -> Result<()> {
        if state.fail_reads {
            Err(ServiceError::unreachable("simulated outage"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArticleService for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    async fn get_all_articles(&self) -> Result<Vec<Article>> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        let mut articles: Vec<Article> = state.articles.values().cloned().collect();
        sort_articles(&mut articles);
        Ok(articles)
    }

    async fn get_article(&self, slug: &str) -> Result<Option<Article>> {
        let state = self.lock();
        Self::check_reachable(&state)?;
        Ok(state.articles.get(slug).cloned())
    }

    async fn create_article(&self, article: &Article) -> Result<()> {
        article.validate().map_err(ServiceError::Validation)?;
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        if state.articles.contains_key(&article.slug) {
            return Err(ServiceError::Conflict(article.slug.clone()));
        }
        state.articles.insert(article.slug.clone(), article.clone());
        Ok(())
    }

    async fn update_article(&self, slug: &str, update: &ArticleUpdate) -> Result<()> {
        let mut state = self.lock();
        Self::check_reachable(&state)?;
        let article = state
            .articles
            .get_mut(slug)
            .ok_or_else(|| ServiceError::NotFound(slug.to_string()))?;
        article.apply_update(update);
        Ok(())
    }

    async fn delete_article(&self, slug: &str) -> Result<bool> {
        let mut state = self.lock();
        if state.failing_deletes.contains(slug) {
            return Err(ServiceError::unreachable(format!(
                "simulated delete failure for {}",
                slug
            )));
        }
        let removed = state.articles.remove(slug).is_some();
        state.assets.retain(|(owner, _), _| owner != slug);
        Ok(removed)
    }

    async fn read_asset(&self, slug: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let state = self.lock();
        Ok(state
            .assets
            .get(&(slug.to_string(), name.to_string()))
            .cloned())
    }

    async fn write_asset(&self, slug: &str, name: &str, data: &[u8]) -> Result<()> {
        if !is_safe_file_name(name) {
            return Err(ServiceError::Validation(format!("invalid asset name '{}'", name)));
        }
        let mut state = self.lock();
        let article = state
            .articles
            .get_mut(slug)
            .ok_or_else(|| ServiceError::NotFound(slug.to_string()))?;
        if !article.assets.iter().any(|a| a == name) {
            article.assets.push(name.to_string());
        }
        state
            .assets
            .insert((slug.to_string(), name.to_string()), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_cycle() {
        let backend = MemoryBackend::new();
        let article = Article::new("hello", "Hello", "world");
        backend.create_article(&article).await.unwrap();
        assert!(matches!(
            backend.create_article(&article).await,
            Err(ServiceError::Conflict(_))
        ));

        backend
            .update_article(
                "hello",
                &ArticleUpdate {
                    content: Some("updated".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            backend.get_article("hello").await.unwrap().unwrap().content,
            "updated"
        );

        assert!(backend.delete_article("hello").await.unwrap());
        assert!(!backend.delete_article("hello").await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_delete_isolates_failures() {
        let backend = MemoryBackend::with_articles(
            ["a", "b", "c"].map(|s| Article::new(s, s.to_uppercase(), "")),
        );
        backend.fail_deletes_for("b");

        let result = backend
            .bulk_delete_articles(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await;
        assert_eq!(result.success, ["a", "c"]);
        assert_eq!(result.failed, ["b"]);

        assert!(backend.get_article("a").await.unwrap().is_none());
        assert!(backend.get_article("b").await.unwrap().is_some());
        assert!(backend.get_article("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_and_filters() {
        let mut react = Article::new("react-hooks", "React Hooks Explained", "");
        react.metadata.tags.insert("frontend".to_string());
        react.metadata.category = "Web".to_string();
        react.metadata.featured = true;
        let mut rust = Article::new("rust-ownership", "Ownership in Rust", "");
        rust.metadata.summary = "Borrowing without tears, unlike React".to_string();
        rust.metadata.category = "Systems".to_string();
        let backend = MemoryBackend::with_articles([react, rust]);

        let slugs = |articles: Vec<Article>| {
            let mut s: Vec<String> = articles.into_iter().map(|a| a.slug).collect();
            s.sort();
            s
        };

        let upper = slugs(backend.search_articles("REACT").await.unwrap());
        let lower = slugs(backend.search_articles("react").await.unwrap());
        assert_eq!(upper, lower);
        assert_eq!(upper, ["react-hooks", "rust-ownership"]);

        assert_eq!(backend.search_articles("").await.unwrap().len(), 2);
        assert_eq!(
            slugs(backend.get_articles_by_tag("frontend").await.unwrap()),
            ["react-hooks"]
        );
        assert!(backend.get_articles_by_tag("Frontend").await.unwrap().is_empty());
        assert_eq!(
            slugs(backend.get_articles_by_category("Systems").await.unwrap()),
            ["rust-ownership"]
        );
        assert_eq!(
            slugs(backend.get_featured_articles().await.unwrap()),
            ["react-hooks"]
        );
    }

    #[tokio::test]
    async fn test_simulated_outage() {
        let backend = MemoryBackend::new();
        backend.set_simulate_unreachable(true);
        assert!(matches!(
            backend.get_all_articles().await,
            Err(ServiceError::Unreachable(_))
        ));
    }
}
