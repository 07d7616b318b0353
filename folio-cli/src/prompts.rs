use anyhow::{bail, Result};
use chrono::Utc;
use inquire::{Confirm, Editor, Password, PasswordDisplayMode, Select, Text};
use std::collections::BTreeSet;
use std::path::PathBuf;

use folio_core::{
    slugify, Article, BackendConfig, BackendType, CmsConfig, CmsKind, DatabaseConfig,
    DatabaseKind, FilesystemConfig,
};

/// Prompts for a backend type and the fields it needs
pub fn prompt_backend_config() -> Result<BackendConfig> {
    let types = vec![BackendType::Filesystem, BackendType::Database, BackendType::Cms];
    let config = match Select::new("Backend type:", types).prompt()? {
        BackendType::Filesystem => BackendConfig::Filesystem(prompt_filesystem()?),
        BackendType::Database => BackendConfig::Database(prompt_database()?),
        BackendType::Cms => BackendConfig::Cms(prompt_cms()?),
        BackendType::Memory => bail!("memory backends cannot be configured"),
    };
    Ok(config)
}

fn prompt_filesystem() -> Result<FilesystemConfig> {
    let defaults = FilesystemConfig::default();
    let articles_path = Text::new("Articles directory:")
        .with_default(&defaults.articles_path.to_string_lossy())
        .prompt()?;
    let assets_path = Text::new("Public assets directory (empty to disable):")
        .with_default(&defaults.assets_path.to_string_lossy())
        .prompt()?;

    Ok(FilesystemConfig {
        articles_path: PathBuf::from(articles_path),
        assets_path: PathBuf::from(assets_path),
    })
}

fn prompt_database() -> Result<DatabaseConfig> {
    let kinds = vec![DatabaseKind::Sqlite, DatabaseKind::Postgresql, DatabaseKind::Mysql];
    let kind = Select::new("Database:", kinds).prompt()?;

    if kind == DatabaseKind::Sqlite {
        let filename = Text::new("Database file:")
            .with_default("data/folio.db")
            .prompt()?;
        return Ok(DatabaseConfig::sqlite(filename));
    }

    let host = Text::new("Host:").with_default("localhost").prompt()?;
    let port = Text::new("Port (empty for default):").prompt()?;
    let port = match port.trim() {
        "" => None,
        value => Some(value.parse::<u16>()?),
    };
    let database = Text::new("Database name:").prompt()?;
    let username = Text::new("Username:").prompt()?;
    let password = prompt_secret("Password:")?;

    Ok(DatabaseConfig {
        kind,
        host,
        port,
        database,
        username,
        password,
        filename: None,
    })
}

fn prompt_cms() -> Result<CmsConfig> {
    let kinds = vec![
        CmsKind::Strapi,
        CmsKind::Contentful,
        CmsKind::Sanity,
        CmsKind::Ghost,
        CmsKind::Custom,
    ];
    let kind = Select::new("CMS:", kinds).prompt()?;
    let api_url = Text::new("API URL:").prompt()?;
    let api_key = prompt_secret("API key:")?;

    let mut config = CmsConfig::new(kind, api_url, api_key);
    match kind {
        CmsKind::Contentful => {
            config.space_id = Some(Text::new("Space ID:").prompt()?);
            let environment = Text::new("Environment:").with_default("master").prompt()?;
            config.environment = Some(environment);
        }
        CmsKind::Sanity => {
            config.project_id = Some(Text::new("Project ID:").prompt()?);
            config.dataset = Some(Text::new("Dataset:").with_default("production").prompt()?);
        }
        CmsKind::Strapi | CmsKind::Ghost | CmsKind::Custom => {}
    }
    Ok(config)
}

fn prompt_secret(message: &str) -> Result<String> {
    Ok(Password::new(message)
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()?)
}

/// Prompts for a new article
pub fn prompt_new_article() -> Result<Article> {
    let title = Text::new("Title:").prompt()?;
    let slug = Text::new("Slug:").with_default(&slugify(&title)).prompt()?;
    let content = Editor::new("Content (Markdown):").prompt()?;

    let mut article = Article::new(slug, title, content);
    let meta = &mut article.metadata;
    meta.summary = Text::new("Summary:").prompt()?;
    meta.author = Text::new("Author:").prompt()?;
    meta.category = Text::new("Category:").prompt()?;

    let tags = Text::new("Tags (comma separated):").prompt()?;
    meta.tags = tags
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>();

    meta.featured = Confirm::new("Featured?").with_default(false).prompt()?;
    meta.published = Confirm::new("Publish now?").with_default(false).prompt()?;
    if meta.published {
        meta.publish_date = Utc::now().format("%Y-%m-%d").to_string();
    }

    if let Err(e) = article.validate() {
        bail!(e);
    }
    Ok(article)
}
