//! Copying articles between backends
//!
//! Migration copies a snapshot of articles into a target backend in
//! batches; sync pushes newer primary records into a fallback. Both work
//! purely through [`ArticleService`], so any pair of backends can be used.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::ArticleService;
use crate::error::{Result, ServiceError};
use crate::models::{Article, ArticleUpdate};

/// Result of [`copy_articles`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

/// Result of [`sync_articles`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub synced: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Creates `articles` on `target` in batches of `batch_size`, in order
///
/// The token is checked before every article; a cancelled run stops there
/// and reports the counts reached so far. With `preserve_assets` the asset
/// bytes are copied from `source` as well; asset failures are recorded but
/// the article still counts as migrated.
pub async fn copy_articles(
    source: &dyn ArticleService,
    target: &dyn ArticleService,
    articles: &[Article],
    batch_size: usize,
    preserve_assets: bool,
    cancel: &CancellationToken,
) -> CopyOutcome {
    let mut outcome = CopyOutcome::default();
    let mut copy_asset_bytes = preserve_assets;
    let batch_size = batch_size.max(1);
    let batches = articles.len().div_ceil(batch_size);

    'batches: for (index, batch) in articles.chunks(batch_size).enumerate() {
        debug!(batch = index + 1, of = batches, size = batch.len(), "Migrating batch");

        for article in batch {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break 'batches;
            }

            let mut copy = article.clone();
            if !preserve_assets {
                copy.assets.clear();
            }

            match target.create_article(&copy).await {
                Ok(()) => {
                    outcome.success += 1;
                    if copy_asset_bytes
                        && copy_assets(source, target, article, &mut outcome.errors).await
                            == AssetCopy::TargetUnsupported
                    {
                        warn!(backend = %target.describe(), "Target keeps no asset files, skipping assets");
                        outcome
                            .errors
                            .push(format!("{} stores no asset files; assets were not copied", target.describe()));
                        copy_asset_bytes = false;
                    }
                }
                Err(e) => {
                    warn!(slug = %article.slug, error = %e, "Failed to migrate article");
                    outcome.failed += 1;
                    outcome.errors.push(format!("{}: {}", article.slug, e));
                }
            }
        }
    }

    if outcome.cancelled {
        warn!(
            migrated = outcome.success,
            failed = outcome.failed,
            "Migration cancelled"
        );
    }
    outcome
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetCopy {
    Done,
    /// The target has no asset storage; later articles need not try
    TargetUnsupported,
}

/// Copies the asset bytes of one article, recording per-file failures in
/// `errors`. A target without asset storage is reported to the caller
/// instead.
async fn copy_assets(
    source: &dyn ArticleService,
    target: &dyn ArticleService,
    article: &Article,
    errors: &mut Vec<String>,
) -> AssetCopy {
    for name in &article.assets {
        let data = match source.read_asset(&article.slug, name).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                errors.push(format!("{}/{}: asset missing in source", article.slug, name));
                continue;
            }
            // Source keeps no asset bytes; nothing to copy for any asset
            Err(ServiceError::Unsupported(_)) => return AssetCopy::Done,
            Err(e) => {
                errors.push(format!("{}/{}: {}", article.slug, name, e));
                continue;
            }
        };

        match target.write_asset(&article.slug, name, &data).await {
            Ok(()) => {}
            Err(ServiceError::Unsupported(_)) => return AssetCopy::TargetUnsupported,
            Err(e) => errors.push(format!("{}/{}: {}", article.slug, name, e)),
        }
    }
    AssetCopy::Done
}

/// Whether a primary record should overwrite the fallback's copy
///
/// Only a strictly newer primary timestamp wins. A primary record without a
/// usable timestamp never overwrites; a fallback record without one loses to
/// any primary record that has one.
fn primary_is_newer(primary: &Article, fallback: &Article) -> bool {
    match (primary.metadata.modified_at(), fallback.metadata.modified_at()) {
        (Some(p), Some(f)) => p > f,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Pushes primary records into the fallback. Nothing is written to `primary`.
pub async fn sync_articles(
    primary: &dyn ArticleService,
    fallback: &dyn ArticleService,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let mut copy_asset_bytes = true;

    let articles = match primary.get_all_articles().await {
        Ok(articles) => articles,
        Err(e) => {
            outcome.errors.push(format!("failed to read primary backend: {}", e));
            return outcome;
        }
    };
    let existing: HashMap<String, Article> = match fallback.get_all_articles().await {
        Ok(list) => list.into_iter().map(|a| (a.slug.clone(), a)).collect(),
        Err(e) => {
            outcome.errors.push(format!("failed to read fallback backend: {}", e));
            return outcome;
        }
    };

    for article in &articles {
        let result = match existing.get(&article.slug) {
            None => fallback.create_article(article).await,
            Some(current) if primary_is_newer(article, current) => {
                fallback
                    .update_article(&article.slug, &ArticleUpdate::replace_with(article))
                    .await
            }
            Some(_) => {
                outcome.skipped += 1;
                continue;
            }
        };

        match result {
            Ok(()) => {
                outcome.synced += 1;
                if copy_asset_bytes
                    && copy_assets(primary, fallback, article, &mut outcome.errors).await
                        == AssetCopy::TargetUnsupported
                {
                    // Records still sync; only the bytes have nowhere to go
                    warn!(fallback = %fallback.describe(), "Fallback keeps no asset files, skipping assets");
                    copy_asset_bytes = false;
                }
            }
            Err(e) => {
                warn!(slug = %article.slug, error = %e, "Failed to sync article");
                outcome.errors.push(format!("{}: {}", article.slug, e));
            }
        }
    }

    info!(
        synced = outcome.synced,
        skipped = outcome.skipped,
        errors = outcome.errors.len(),
        "Sync finished"
    );
    outcome
}

/// Writes a ZIP export of every article in `source` into `dir`, returning
/// the archive path
pub async fn write_backup(source: &dyn ArticleService, dir: &Path) -> Result<PathBuf> {
    let bytes = source.export_as_zip(&[]).await?;
    let path = dir.join(format!(
        "folio-backup-{}.zip",
        Utc::now().format("%Y%m%d-%H%M%S")
    ));

    let dir = dir.to_path_buf();
    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir).map_err(|e| ServiceError::io(&dir, e))?;
        std::fs::write(&target, bytes).map_err(|e| ServiceError::io(&target, e))
    })
    .await??;

    info!(path = %path.display(), "Wrote backup archive");
    Ok(path)
}
