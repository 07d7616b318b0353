mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::Path;
use tracing::debug;

use cli::{ArticleCommand, BackendCommand, Cli, Command};
use folio_core::{
    init_logger, Article, ArticleService, BackendConfig, BackendManager, CancellationToken,
    LogConfig, LogFormat, LogLevel, MigrationOptions, SettingsPatch, SettingsStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level: LogLevel = cli.log_level.parse().map_err(anyhow::Error::msg)?;
    let log_config = LogConfig {
        level,
        format: if cli.log_json { LogFormat::Json } else { LogFormat::Text },
        file_dir: None,
    };
    let _guard = init_logger(&log_config)?;

    let store = match &cli.settings {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::open_default()?,
    };
    debug!(path = %store.path().display(), "Using settings file");
    let manager = BackendManager::load(store).context("Failed to load backend settings")?;

    let result = match &cli.command {
        Command::Backend(command) => run_backend_command(&manager, command).await,
        Command::Migrate {
            to,
            dry_run,
            batch_size,
            backup_dir,
            skip_assets,
        } => {
            let options = MigrationOptions {
                dry_run: *dry_run,
                batch_size: *batch_size,
                preserve_assets: skip_assets.then_some(false),
                backup_before: backup_dir.as_ref().map(|_| true),
                backup_dir: backup_dir.clone(),
                cancel: CancellationToken::new(),
            };
            migrate(&manager, to, options).await
        }
        Command::Sync => sync(&manager).await,
        Command::Article(command) => run_article_command(manager.service().as_ref(), command).await,
    };

    manager.shutdown().await;
    result
}

fn read_config(path: &Path) -> Result<BackendConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backend config {}", path.display()))?;
    BackendConfig::from_json(&json)
        .with_context(|| format!("Invalid backend config {}", path.display()))
}

async fn run_backend_command(manager: &BackendManager, command: &BackendCommand) -> Result<()> {
    match command {
        BackendCommand::Info { json } => show_info(manager, *json),
        BackendCommand::Test { config } => {
            let config = config.as_deref().map(read_config).transpose()?;
            let target = config
                .as_ref()
                .map(BackendConfig::describe)
                .unwrap_or_else(|| manager.settings().primary.describe());
            if manager.test_connection(config.as_ref()).await {
                println!("{} {}", "Connection OK:".green(), target);
                Ok(())
            } else {
                anyhow::bail!("Connection failed: {}", target)
            }
        }
        BackendCommand::Switch { config } => switch(manager, read_config(config)?).await,
        BackendCommand::Select => {
            let config = prompts::prompt_backend_config()?;
            switch(manager, config).await
        }
        BackendCommand::Fallback { config, clear } => {
            let fallback = if *clear {
                None
            } else {
                Some(match config {
                    Some(path) => read_config(path)?,
                    None => prompts::prompt_backend_config()?,
                })
            };
            let description = fallback.as_ref().map(BackendConfig::describe);
            manager
                .update_settings(SettingsPatch {
                    fallback: Some(fallback),
                    ..Default::default()
                })
                .await
                .context("Failed to update fallback backend")?;
            match description {
                Some(d) => println!("{} {}", "Fallback set to".green(), d),
                None => println!("{}", "Fallback cleared".green()),
            }
            Ok(())
        }
        BackendCommand::SyncEnabled { enabled } => {
            manager
                .update_settings(SettingsPatch {
                    sync_enabled: Some(*enabled),
                    ..Default::default()
                })
                .await
                .context("Failed to update sync setting")?;
            let state = if *enabled { "enabled".green() } else { "disabled".yellow() };
            println!("Sync {}", state);
            Ok(())
        }
    }
}

fn show_info(manager: &BackendManager, json: bool) -> Result<()> {
    let info = manager.backend_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{:<10} {}", "Primary:".bold(), info.primary.describe());
    match &info.fallback {
        Some(fallback) => println!("{:<10} {}", "Fallback:".bold(), fallback.describe()),
        None => println!("{:<10} {}", "Fallback:".bold(), "none".dimmed()),
    }
    let sync = if info.sync_enabled { "enabled".green() } else { "disabled".yellow() };
    println!("{:<10} {}", "Sync:".bold(), sync);
    Ok(())
}

async fn switch(manager: &BackendManager, config: BackendConfig) -> Result<()> {
    let description = config.describe();
    if manager.switch_backend(config).await {
        println!("{} {}", "Switched primary backend to".green(), description);
        Ok(())
    } else {
        anyhow::bail!(
            "Could not switch to {}; the previous backend is still active",
            description
        )
    }
}

async fn migrate(manager: &BackendManager, to: &Path, options: MigrationOptions) -> Result<()> {
    let config = read_config(to)?;
    let dry_run = options.dry_run;

    // First Ctrl-C stops the migration after the current article
    let cancel = options.cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = manager.migrate_to_backend(&config, options).await;
    watcher.abort();

    let verb = if dry_run { "Would migrate" } else { "Migrated" };
    println!(
        "{} {} article(s) to {}",
        verb.green(),
        report.success,
        config.describe()
    );
    if report.failed > 0 {
        println!("{} {}", "Failed:".red(), report.failed);
    }
    print_errors(&report.errors);
    if report.cancelled {
        println!("{}", "Migration cancelled".yellow());
    }

    if report.failed > 0 || (report.success == 0 && !report.errors.is_empty()) {
        anyhow::bail!("Migration finished with errors");
    }
    Ok(())
}

async fn sync(manager: &BackendManager) -> Result<()> {
    let report = manager.sync_backends().await;
    println!(
        "{} {} synced, {} skipped",
        "Sync:".green(),
        report.synced,
        report.skipped
    );
    print_errors(&report.errors);
    if !report.errors.is_empty() {
        anyhow::bail!("Sync finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

fn print_errors(errors: &[String]) {
    for error in errors {
        println!("  {} {}", "-".red(), error);
    }
}

async fn run_article_command(service: &dyn ArticleService, command: &ArticleCommand) -> Result<()> {
    match command {
        ArticleCommand::List {
            tag,
            category,
            featured,
        } => {
            let mut articles = match (tag, category) {
                (Some(tag), _) => service.get_articles_by_tag(tag).await?,
                (None, Some(category)) => service.get_articles_by_category(category).await?,
                (None, None) => service.get_all_articles().await?,
            };
            if let (Some(_), Some(category)) = (tag, category) {
                articles.retain(|a| a.metadata.category == *category);
            }
            if *featured {
                articles.retain(|a| a.metadata.featured);
            }
            print_article_table(&articles);
            Ok(())
        }
        ArticleCommand::Show { slug, json } => {
            let article = service
                .get_article(slug)
                .await?
                .with_context(|| format!("Article '{}' not found", slug))?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&article)?);
            } else {
                print_article(&article);
            }
            Ok(())
        }
        ArticleCommand::Search { query } => {
            let articles = service.search_articles(query).await?;
            print_article_table(&articles);
            Ok(())
        }
        ArticleCommand::Create => {
            let article = prompts::prompt_new_article()?;
            service
                .create_article(&article)
                .await
                .with_context(|| format!("Failed to create '{}'", article.slug))?;
            println!("{} {}", "Created article".green(), article.slug);
            Ok(())
        }
        ArticleCommand::Delete { slugs, yes } => {
            if !*yes {
                let confirm = inquire::Confirm::new(&format!(
                    "Delete {} article(s): {}?",
                    slugs.len(),
                    slugs.join(", ")
                ))
                .with_default(false)
                .prompt()?;
                if !confirm {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
            }

            let result = service.bulk_delete_articles(slugs).await;
            for slug in &result.success {
                println!("{} {}", "Deleted".green(), slug);
            }
            for slug in &result.failed {
                println!("{} {}", "Not deleted".red(), slug);
            }
            if !result.failed.is_empty() {
                anyhow::bail!("{} article(s) could not be deleted", result.failed.len());
            }
            Ok(())
        }
        ArticleCommand::Import { file } => {
            let data = std::fs::read(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let imported = service
                .upload_from_zip(&data)
                .await
                .context("Failed to import ZIP bundle")?;
            for article in &imported {
                println!(
                    "{} {} {}",
                    "Imported".green(),
                    article.slug,
                    article.title.as_deref().unwrap_or_default().dimmed()
                );
            }
            println!("{} article(s) imported", imported.len());
            Ok(())
        }
        ArticleCommand::Export { slugs, output } => {
            let data = service.export_as_zip(slugs).await.context("Failed to export articles")?;
            std::fs::write(output, data)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("{} {}", "Exported to".green(), output.display());
            Ok(())
        }
    }
}

fn print_article_table(articles: &[Article]) {
    if articles.is_empty() {
        println!("{}", "No articles found.".yellow());
        return;
    }

    println!(
        "{:<30} | {:<40} | {:<12} | {:<15} | {:<9}",
        "Slug", "Title", "Published", "Category", "Status"
    );
    println!("{}", "-".repeat(116));

    for article in articles {
        let meta = &article.metadata;
        let status = if meta.published { "published".green() } else { "draft".yellow() };
        let title = if meta.featured {
            format!("* {}", meta.title)
        } else {
            meta.title.clone()
        };
        println!(
            "{:<30} | {:<40} | {:<12} | {:<15} | {:<9}",
            truncate(&article.slug, 30),
            truncate(&title, 40),
            truncate(&meta.publish_date, 12),
            truncate(&meta.category, 15),
            status
        );
    }
}

fn print_article(article: &Article) {
    let meta = &article.metadata;
    println!("{}", meta.title.bold());
    println!("{:<14} {}", "Slug:", article.slug);
    println!("{:<14} {}", "Author:", meta.author);
    println!("{:<14} {}", "Published:", meta.publish_date);
    if !meta.last_modified.is_empty() {
        println!("{:<14} {}", "Modified:", meta.last_modified);
    }
    println!("{:<14} {}", "Category:", meta.category);
    let tags: Vec<&str> = meta.tags.iter().map(String::as_str).collect();
    println!("{:<14} {}", "Tags:", tags.join(", "));
    println!("{:<14} {} min", "Reading time:", meta.reading_time);
    println!("{:<14} {}", "Featured:", meta.featured);
    println!("{:<14} {}", "Status:", if meta.published { "published" } else { "draft" });
    if !article.assets.is_empty() {
        println!("{:<14} {}", "Assets:", article.assets.join(", "));
    }
    if !meta.summary.is_empty() {
        println!("\n{}", meta.summary.italic());
    }
    println!("\n{}", article.content);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
