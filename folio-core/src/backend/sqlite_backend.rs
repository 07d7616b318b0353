//! SQLite database article backend
//!
//! One row per article in `articles`, asset bytes in `article_assets`.
//! Tags, SEO data and the asset list are stored as JSON text columns.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::traits::ArticleService;
use crate::archive::is_safe_file_name;
use crate::config::BackendType;
use crate::error::{Result, ServiceError};
use crate::models::{sort_articles, Article, ArticleMetadata, ArticleUpdate, SeoMetadata};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const ARTICLE_COLUMNS: &str = "slug, title, summary, author, publish_date, last_modified, tags, \
     category, cover_image, reading_time, featured, published, seo, content, assets";

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    /// `None` once the backend has been closed
    conn: Arc<Mutex<Option<Connection>>>,
}

/// Raw column values of one `articles` row, before JSON decoding
struct ArticleRow {
    slug: String,
    title: String,
    summary: String,
    author: String,
    publish_date: String,
    last_modified: String,
    tags: String,
    category: String,
    cover_image: String,
    reading_time: u32,
    featured: bool,
    published: bool,
    seo: String,
    content: String,
    assets: String,
}

impl ArticleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            slug: row.get(0)?,
            title: row.get(1)?,
            summary: row.get(2)?,
            author: row.get(3)?,
            publish_date: row.get(4)?,
            last_modified: row.get(5)?,
            tags: row.get(6)?,
            category: row.get(7)?,
            cover_image: row.get(8)?,
            reading_time: row.get(9)?,
            featured: row.get(10)?,
            published: row.get(11)?,
            seo: row.get(12)?,
            content: row.get(13)?,
            assets: row.get(14)?,
        })
    }

    fn into_article(self) -> Result<Article> {
        let seo: SeoMetadata = from_json(&self.seo)?;
        Ok(Article {
            slug: self.slug,
            metadata: ArticleMetadata {
                title: self.title,
                summary: self.summary,
                author: self.author,
                publish_date: self.publish_date,
                last_modified: self.last_modified,
                tags: from_json(&self.tags)?,
                category: self.category,
                cover_image: self.cover_image,
                reading_time: self.reading_time,
                featured: self.featured,
                published: self.published,
                seo,
            },
            content: self.content,
            assets: from_json(&self.assets)?,
        })
    }
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file and initializes the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::io(parent, e))?;
        }

        let conn = Connection::open(&path)?;

        // WAL for concurrent readers; foreign keys for asset cascade
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;

        info!(path = %path.display(), "Opened SQLite article database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ServiceError::unreachable("database connection lock poisoned"))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| ServiceError::unreachable("database connection is closed"))?;
            op(conn)
        })
        .await?
    }
}

/// Initialize the database schema
fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if current_version == 0 {
        conn.execute_batch(include_str!("schema.sql"))?;
    } else if current_version != SCHEMA_VERSION {
        return Err(ServiceError::Configuration(format!(
            "database schema version {} is not supported, expected {}",
            current_version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

fn select_article(conn: &Connection, slug: &str) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE slug = ?1", ARTICLE_COLUMNS);
    conn.query_row(&sql, [slug], ArticleRow::from_row)
        .optional()?
        .map(ArticleRow::into_article)
        .transpose()
}

fn select_articles(conn: &Connection, filter: Option<(&str, &str)>) -> Result<Vec<Article>> {
    let rows: Vec<ArticleRow> = match filter {
        None => {
            let sql = format!("SELECT {} FROM articles", ARTICLE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], ArticleRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        Some((column, value)) => {
            let sql = format!("SELECT {} FROM articles WHERE {} = ?1", ARTICLE_COLUMNS, column);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([value], ArticleRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };

    let mut articles = rows
        .into_iter()
        .map(ArticleRow::into_article)
        .collect::<Result<Vec<_>>>()?;
    sort_articles(&mut articles);
    Ok(articles)
}

/// Inserts or overwrites the row for `article`. An upsert rather than
/// `INSERT OR REPLACE`, which would delete the row and cascade to its assets.
fn save_article(tx: &Transaction<'_>, article: &Article) -> Result<()> {
    let meta = &article.metadata;
    let assignments = ARTICLE_COLUMNS
        .split(',')
        .map(str::trim)
        .filter(|c| *c != "slug")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!(
            "INSERT INTO articles ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
             ON CONFLICT(slug) DO UPDATE SET {}",
            ARTICLE_COLUMNS, assignments
        ),
        params![
            article.slug,
            meta.title,
            meta.summary,
            meta.author,
            meta.publish_date,
            meta.last_modified,
            to_json(&meta.tags)?,
            meta.category,
            meta.cover_image,
            meta.reading_time,
            meta.featured,
            meta.published,
            to_json(&meta.seo)?,
            article.content,
            to_json(&article.assets)?,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl ArticleService for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Database
    }

    fn describe(&self) -> String {
        format!("SQLite ({})", self.path.display())
    }

    async fn get_all_articles(&self) -> Result<Vec<Article>> {
        self.run(|conn| select_articles(conn, None)).await
    }

    async fn get_article(&self, slug: &str) -> Result<Option<Article>> {
        let slug = slug.to_string();
        self.run(move |conn| select_article(conn, &slug)).await
    }

    async fn create_article(&self, article: &Article) -> Result<()> {
        article.validate().map_err(ServiceError::Validation)?;
        let article = article.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = ?1)",
                [&article.slug],
                |row| row.get(0),
            )?;
            if exists {
                return Err(ServiceError::Conflict(article.slug.clone()));
            }
            save_article(&tx, &article)?;
            tx.commit()?;
            debug!(slug = %article.slug, "Created article row");
            Ok(())
        })
        .await
    }

    async fn update_article(&self, slug: &str, update: &ArticleUpdate) -> Result<()> {
        let slug = slug.to_string();
        let update = update.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut article =
                select_article(&tx, &slug)?.ok_or_else(|| ServiceError::NotFound(slug.clone()))?;
            article.apply_update(&update);
            save_article(&tx, &article)?;

            // Stored bytes follow the asset list
            if update.assets.is_some() {
                let stored: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT name FROM article_assets WHERE slug = ?1")?;
                    let names = stmt
                        .query_map([&slug], |row| row.get(0))?
                        .collect::<rusqlite::Result<Vec<String>>>()?;
                    names
                };
                for name in stored.iter().filter(|n| !article.assets.contains(n)) {
                    tx.execute(
                        "DELETE FROM article_assets WHERE slug = ?1 AND name = ?2",
                        params![slug, name],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_article(&self, slug: &str) -> Result<bool> {
        let slug = slug.to_string();
        self.run(move |conn| {
            let rows_affected = conn.execute("DELETE FROM articles WHERE slug = ?1", [&slug])?;
            Ok(rows_affected > 0)
        })
        .await
    }

    async fn get_articles_by_category(&self, category: &str) -> Result<Vec<Article>> {
        let category = category.to_string();
        self.run(move |conn| select_articles(conn, Some(("category", &category))))
            .await
    }

    async fn read_asset(&self, slug: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let slug = slug.to_string();
        let name = name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT data FROM article_assets WHERE slug = ?1 AND name = ?2",
                    params![slug, name],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn write_asset(&self, slug: &str, name: &str, data: &[u8]) -> Result<()> {
        if !is_safe_file_name(name) {
            return Err(ServiceError::Validation(format!("invalid asset name '{}'", name)));
        }
        let slug = slug.to_string();
        let name = name.to_string();
        let data = data.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut article =
                select_article(&tx, &slug)?.ok_or_else(|| ServiceError::NotFound(slug.clone()))?;
            tx.execute(
                "INSERT OR REPLACE INTO article_assets (slug, name, data) VALUES (?1, ?2, ?3)",
                params![slug, name, data],
            )?;
            if !article.assets.contains(&name) {
                article.assets.push(name);
                article.assets.sort();
                tx.execute(
                    "UPDATE articles SET assets = ?1 WHERE slug = ?2",
                    params![to_json(&article.assets)?, slug],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let taken = conn
                .lock()
                .map_err(|_| ServiceError::unreachable("database connection lock poisoned"))?
                .take();
            if let Some(conn) = taken {
                conn.close().map_err(|(_, e)| ServiceError::Database(e))?;
                info!(path = %path.display(), "Closed SQLite article database");
            }
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataPatch;
    use tempfile::TempDir;

    fn open() -> (TempDir, SqliteBackend) {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(dir.path().join("data").join("folio.db")).unwrap();
        (dir, backend)
    }

    fn rich_article() -> Article {
        let mut article = Article::new("sqlite-tips", "SQLite Tips", "# Tips\n\nUse WAL.");
        article.metadata.tags.insert("databases".to_string());
        article.metadata.tags.insert("sqlite".to_string());
        article.metadata.category = "Engineering".to_string();
        article.metadata.publish_date = "2024-03-10".to_string();
        article.metadata.reading_time = 4;
        article.metadata.featured = true;
        article.metadata.seo.meta_description = "Practical SQLite".to_string();
        article
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let (_dir, backend) = open();
        assert!(backend.get_all_articles().await.unwrap().is_empty());

        let article = rich_article();
        backend.create_article(&article).await.unwrap();
        assert_eq!(backend.get_article("sqlite-tips").await.unwrap(), Some(article.clone()));

        assert!(matches!(
            backend.create_article(&article).await,
            Err(ServiceError::Conflict(_))
        ));

        let update = ArticleUpdate {
            metadata: Some(MetadataPatch {
                title: Some("SQLite Tips, Revised".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        backend.update_article("sqlite-tips", &update).await.unwrap();
        let loaded = backend.get_article("sqlite-tips").await.unwrap().unwrap();
        assert_eq!(loaded.metadata.title, "SQLite Tips, Revised");
        assert_eq!(loaded.metadata.tags, article.metadata.tags);
        assert!(!loaded.metadata.last_modified.is_empty());

        assert!(matches!(
            backend.update_article("missing", &update).await,
            Err(ServiceError::NotFound(_))
        ));

        assert!(backend.delete_article("sqlite-tips").await.unwrap());
        assert!(!backend.delete_article("sqlite-tips").await.unwrap());
        assert!(backend.get_article("sqlite-tips").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.db");
        {
            let backend = SqliteBackend::new(&path).unwrap();
            backend.create_article(&rich_article()).await.unwrap();
            backend.close().await.unwrap();
        }
        let backend = SqliteBackend::new(&path).unwrap();
        assert_eq!(backend.get_all_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_assets_cascade_with_article() {
        let (_dir, backend) = open();
        backend.create_article(&rich_article()).await.unwrap();
        backend
            .write_asset("sqlite-tips", "wal.png", b"png-bytes")
            .await
            .unwrap();

        let article = backend.get_article("sqlite-tips").await.unwrap().unwrap();
        assert_eq!(article.assets, ["wal.png"]);
        assert_eq!(
            backend.read_asset("sqlite-tips", "wal.png").await.unwrap(),
            Some(b"png-bytes".to_vec())
        );
        assert!(matches!(
            backend.write_asset("nope", "a.png", b"x").await,
            Err(ServiceError::NotFound(_))
        ));

        backend.delete_article("sqlite-tips").await.unwrap();
        backend.create_article(&rich_article()).await.unwrap();
        assert!(backend
            .read_asset("sqlite-tips", "wal.png")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_category_filter_uses_exact_match() {
        let (_dir, backend) = open();
        backend.create_article(&rich_article()).await.unwrap();
        let mut other = Article::new("other", "Other", "");
        other.metadata.category = "engineering".to_string();
        backend.create_article(&other).await.unwrap();

        let found = backend.get_articles_by_category("Engineering").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "sqlite-tips");
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let (_dir, backend) = open();
        backend.close().await.unwrap();
        // Closing twice is harmless
        backend.close().await.unwrap();

        assert!(matches!(
            backend.get_all_articles().await,
            Err(ServiceError::Unreachable(_))
        ));
        assert!(matches!(
            backend.create_article(&rich_article()).await,
            Err(ServiceError::Unreachable(_))
        ));
    }
}
