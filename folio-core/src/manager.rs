//! Backend configuration manager
//!
//! [`BackendManager`] owns the active settings together with the primary and
//! optional fallback services built from them. Settings and services are
//! swapped together under one lock, so readers always see a matching pair.
//! The lock is never held across an `.await`. Changes are serialized by a
//! separate writer mutex, and the settings file is written before the state
//! lock is taken.
//!
//! Operations that can fail for reasons outside the caller's control
//! (switching, probing, migrating, syncing) report failure as data: a `bool`
//! or a report carrying human-readable errors. Only construction and
//! [`BackendManager::update_settings`] return `Result`.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{
    copy_articles, sync_articles, write_backup, ArticleService, DefaultServiceFactory,
    ServiceFactory,
};
use crate::config::{BackendConfig, BackendSettings, SettingsPatch};
use crate::error::Result;
use crate::settings::SettingsStore;

/// Per-call migration options; unset values fall back to the persisted
/// migration settings
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Validate the target and count without building or writing it
    pub dry_run: bool,
    pub batch_size: Option<usize>,
    pub preserve_assets: Option<bool>,
    pub backup_before: Option<bool>,
    /// Where the pre-migration backup archive goes
    pub backup_dir: Option<PathBuf>,
    /// Checked before every article
    pub cancel: CancellationToken,
}

/// Outcome of [`BackendManager::migrate_to_backend`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

/// Outcome of [`BackendManager::sync_backends`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Redacted view of the active configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInfo {
    pub primary: BackendConfig,
    pub fallback: Option<BackendConfig>,
    pub sync_enabled: bool,
}

struct ManagerState {
    settings: BackendSettings,
    primary: Arc<dyn ArticleService>,
    fallback: Option<Arc<dyn ArticleService>>,
}

/// Selects, switches and bridges article backends
pub struct BackendManager {
    state: RwLock<ManagerState>,
    /// Serializes settings changes so the file write can happen outside
    /// the state lock
    writer: tokio::sync::Mutex<()>,
    factory: Arc<dyn ServiceFactory>,
    store: Option<SettingsStore>,
}

impl BackendManager {
    /// Builds the services for `settings` with the default factory
    pub fn new(settings: BackendSettings) -> Result<Self> {
        Self::with_factory(settings, Arc::new(DefaultServiceFactory))
    }

    /// Builds the services for `settings` through `factory`
    ///
    /// Fails if the primary cannot be built. A fallback that cannot be built
    /// is logged and left unset.
    pub fn with_factory(settings: BackendSettings, factory: Arc<dyn ServiceFactory>) -> Result<Self> {
        let primary = factory.create(&settings.primary)?;
        let fallback = settings.fallback.as_ref().and_then(|config| {
            factory
                .create(config)
                .map_err(|e| {
                    error!(backend = %config.describe(), error = %e, "Failed to initialize fallback backend")
                })
                .ok()
        });

        info!(
            primary = %primary.describe(),
            fallback = fallback.as_ref().map(|f| f.describe()).unwrap_or_default(),
            "Backend manager initialized"
        );

        Ok(Self {
            state: RwLock::new(ManagerState {
                settings,
                primary,
                fallback,
            }),
            writer: tokio::sync::Mutex::new(()),
            factory,
            store: None,
        })
    }

    /// Loads settings from `store` and persists later changes back to it
    pub fn load(store: SettingsStore) -> Result<Self> {
        let settings = store.load()?;
        Ok(Self::new(settings)?.with_store(store))
    }

    /// Attaches a settings store; `switch_backend` and `update_settings`
    /// persist through it from now on
    pub fn with_store(mut self, store: SettingsStore) -> Self {
        self.store = Some(store);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, ManagerState> {
        // State is only replaced wholesale, so a poisoned lock still holds
        // a consistent value
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The active primary service
    pub fn service(&self) -> Arc<dyn ArticleService> {
        Arc::clone(&self.read().primary)
    }

    pub fn fallback_service(&self) -> Option<Arc<dyn ArticleService>> {
        self.read().fallback.clone()
    }

    /// Snapshot of the active settings
    pub fn settings(&self) -> BackendSettings {
        self.read().settings.clone()
    }

    pub fn backend_info(&self) -> BackendInfo {
        let state = self.read();
        BackendInfo {
            primary: state.settings.primary.redacted(),
            fallback: state.settings.fallback.as_ref().map(BackendConfig::redacted),
            sync_enabled: state.settings.sync_enabled,
        }
    }

    /// Builds a service for `config` and checks that it can list articles
    async fn build_and_probe(&self, config: &BackendConfig) -> Option<Arc<dyn ArticleService>> {
        let service = match self.factory.create(config) {
            Ok(service) => service,
            Err(e) => {
                warn!(backend = %config.describe(), error = %e, "Failed to build backend");
                return None;
            }
        };

        match service.get_all_articles().await {
            Ok(articles) => {
                debug!(backend = %service.describe(), articles = articles.len(), "Backend probe succeeded");
                Some(service)
            }
            Err(e) => {
                warn!(backend = %service.describe(), error = %e, "Backend probe failed");
                close_quietly(service.as_ref()).await;
                None
            }
        }
    }

    /// Replaces the primary backend
    ///
    /// The new service is built and probed first; the settings are persisted
    /// and the service swapped in only if that succeeds. On any failure
    /// nothing changes. The previous primary is closed after the swap.
    pub async fn switch_backend(&self, config: BackendConfig) -> bool {
        let Some(service) = self.build_and_probe(&config).await else {
            return false;
        };

        let _writer = self.writer.lock().await;
        let mut next = self.settings();
        next.primary = config;
        if let Err(e) = self.persist(&next).await {
            error!(error = %e, "Failed to persist backend switch");
            close_quietly(service.as_ref()).await;
            return false;
        }

        let previous = {
            let mut state = self.write();
            state.settings = next;
            std::mem::replace(&mut state.primary, Arc::clone(&service))
        };

        info!(
            from = %previous.describe(),
            to = %service.describe(),
            "Switched primary backend"
        );
        close_quietly(previous.as_ref()).await;
        true
    }

    /// Probes a backend without changing anything; `None` probes the
    /// active primary
    pub async fn test_connection(&self, config: Option<&BackendConfig>) -> bool {
        match config {
            None => {
                let service = self.service();
                match service.get_all_articles().await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(backend = %service.describe(), error = %e, "Backend probe failed");
                        false
                    }
                }
            }
            Some(config) => match self.build_and_probe(config).await {
                Some(service) => {
                    close_quietly(service.as_ref()).await;
                    true
                }
                None => false,
            },
        }
    }

    /// Copies every article of the primary into a freshly built target
    ///
    /// Best effort: one article failing does not stop the rest. Duplicate
    /// slugs on the target fail with a conflict, so re-running a partial
    /// migration only adds what is missing.
    pub async fn migrate_to_backend(
        &self,
        config: &BackendConfig,
        options: MigrationOptions,
    ) -> MigrationReport {
        let (source, defaults) = {
            let state = self.read();
            (Arc::clone(&state.primary), state.settings.migration_settings.clone())
        };
        let batch_size = options
            .batch_size
            .filter(|n| *n > 0)
            .unwrap_or(defaults.batch_size)
            .max(1);
        let preserve_assets = options.preserve_assets.unwrap_or(defaults.preserve_assets);
        let backup_before = options.backup_before.unwrap_or(defaults.backup_before);

        let mut report = MigrationReport::default();

        let articles = match source.get_all_articles().await {
            Ok(articles) => articles,
            Err(e) => {
                report.errors.push(format!("failed to read source backend: {}", e));
                return report;
            }
        };

        if options.dry_run {
            match config.validate() {
                Ok(()) => report.success = articles.len(),
                Err(e) => {
                    report.failed = articles.len();
                    report.errors.push(e.to_string());
                }
            }
            info!(
                target = %config.describe(),
                would_migrate = report.success,
                "Dry-run migration finished"
            );
            return report;
        }

        if backup_before {
            let Some(dir) = options.backup_dir.as_deref() else {
                report
                    .errors
                    .push("backup requested but no backup directory given".to_string());
                return report;
            };
            if let Err(e) = write_backup(source.as_ref(), dir).await {
                report.errors.push(format!("backup failed, migration aborted: {}", e));
                return report;
            }
        }

        let target = match self.factory.create(config) {
            Ok(target) => target,
            Err(e) => {
                report.failed = articles.len();
                report.errors.push(format!("failed to initialize target backend: {}", e));
                return report;
            }
        };

        info!(
            from = %source.describe(),
            to = %target.describe(),
            articles = articles.len(),
            batch_size,
            "Starting migration"
        );

        let outcome = copy_articles(
            source.as_ref(),
            target.as_ref(),
            &articles,
            batch_size,
            preserve_assets,
            &options.cancel,
        )
        .await;
        close_quietly(target.as_ref()).await;

        info!(
            success = outcome.success,
            failed = outcome.failed,
            cancelled = outcome.cancelled,
            "Migration finished"
        );

        MigrationReport {
            success: outcome.success,
            failed: outcome.failed,
            errors: outcome.errors,
            cancelled: outcome.cancelled,
        }
    }

    /// Pushes newer primary records into the fallback
    pub async fn sync_backends(&self) -> SyncReport {
        let (enabled, primary, fallback) = {
            let state = self.read();
            (
                state.settings.sync_enabled,
                Arc::clone(&state.primary),
                state.fallback.clone(),
            )
        };

        if !enabled {
            return SyncReport {
                errors: vec!["sync is disabled".to_string()],
                ..Default::default()
            };
        }
        let Some(fallback) = fallback else {
            return SyncReport {
                errors: vec!["no fallback backend configured".to_string()],
                ..Default::default()
            };
        };

        let outcome = sync_articles(primary.as_ref(), fallback.as_ref()).await;
        SyncReport {
            synced: outcome.synced,
            skipped: outcome.skipped,
            errors: outcome.errors,
        }
    }

    /// Merges `patch` into the settings
    ///
    /// A `primary` or `fallback` key rebuilds that service even when the
    /// config is unchanged. Replacement services are built before anything
    /// is committed; if one fails, or persisting fails, nothing changes.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        let new_primary = match &patch.primary {
            Some(config) => Some(self.factory.create(config)?),
            None => None,
        };
        let new_fallback = match &patch.fallback {
            Some(Some(config)) => match self.factory.create(config) {
                Ok(service) => Some(Some(service)),
                Err(e) => {
                    if let Some(service) = &new_primary {
                        close_quietly(service.as_ref()).await;
                    }
                    return Err(e);
                }
            },
            Some(None) => Some(None),
            None => None,
        };

        let _writer = self.writer.lock().await;
        let mut next = self.settings();
        if let Some(config) = patch.primary {
            next.primary = config;
        }
        if let Some(fallback) = patch.fallback {
            next.fallback = fallback;
        }
        if let Some(enabled) = patch.sync_enabled {
            next.sync_enabled = enabled;
        }
        if let Some(migration) = patch.migration_settings {
            next.migration_settings = migration;
        }

        if let Err(e) = self.persist(&next).await {
            let built = new_primary
                .into_iter()
                .chain(new_fallback.into_iter().flatten());
            for service in built {
                close_quietly(service.as_ref()).await;
            }
            return Err(e);
        }

        let replaced = {
            let mut state = self.write();
            state.settings = next;
            let mut replaced = Vec::new();
            if let Some(service) = new_primary {
                replaced.push(std::mem::replace(&mut state.primary, service));
            }
            if let Some(fallback) = new_fallback {
                replaced.extend(std::mem::replace(&mut state.fallback, fallback));
            }
            replaced
        };

        for service in replaced {
            close_quietly(service.as_ref()).await;
        }
        info!("Backend settings updated");
        Ok(())
    }

    /// Writes `settings` to the attached store off the async runtime
    async fn persist(&self, settings: &BackendSettings) -> Result<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || store.save(&settings)).await?
    }

    /// Closes the primary and fallback services; call once before exit
    pub async fn shutdown(&self) {
        let (primary, fallback) = {
            let state = self.read();
            (Arc::clone(&state.primary), state.fallback.clone())
        };
        close_quietly(primary.as_ref()).await;
        if let Some(fallback) = fallback {
            close_quietly(fallback.as_ref()).await;
        }
    }
}

async fn close_quietly(service: &dyn ArticleService) {
    if let Err(e) = service.close().await {
        warn!(backend = %service.describe(), error = %e, "Failed to close backend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{create_service, MemoryBackend};
    use crate::config::{CmsConfig, CmsKind, DatabaseConfig, FilesystemConfig};
    use crate::error::ServiceError;
    use crate::models::Article;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Maps CMS configs to in-memory services keyed by `apiUrl`; every
    /// other config goes through the real factory
    #[derive(Default)]
    struct TestFactory {
        services: Mutex<Vec<(String, Arc<MemoryBackend>)>>,
    }

    impl TestFactory {
        fn register(&self, url: &str, backend: Arc<MemoryBackend>) {
            self.services.lock().unwrap().push((url.to_string(), backend));
        }
    }

    impl ServiceFactory for TestFactory {
        fn create(&self, config: &BackendConfig) -> Result<Arc<dyn ArticleService>> {
            if let BackendConfig::Cms(cms) = config {
                let services = self.services.lock().unwrap();
                if let Some((_, backend)) = services.iter().find(|(url, _)| *url == cms.api_url) {
                    return Ok(Arc::clone(backend) as Arc<dyn ArticleService>);
                }
            }
            create_service(config)
        }
    }

    fn memory_config(url: &str) -> BackendConfig {
        BackendConfig::Cms(CmsConfig::new(CmsKind::Custom, url, "secret"))
    }

    fn fs_config(dir: &TempDir) -> BackendConfig {
        BackendConfig::Filesystem(FilesystemConfig {
            articles_path: dir.path().join("articles"),
            assets_path: dir.path().join("public"),
        })
    }

    fn settings_with(primary: BackendConfig) -> BackendSettings {
        BackendSettings {
            primary,
            ..Default::default()
        }
    }

    async fn seed(service: &dyn ArticleService, slugs: &[&str]) {
        for slug in slugs {
            let mut article = Article::new(*slug, slug.to_uppercase(), format!("# {}\n", slug));
            article.metadata.last_modified = "2024-01-01T00:00:00Z".to_string();
            service.create_article(&article).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sync_filesystem_primary_into_empty_memory_fallback() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(TestFactory::default());
        let fallback = Arc::new(MemoryBackend::new());
        factory.register("http://memory.fallback", Arc::clone(&fallback));

        let settings = BackendSettings {
            primary: fs_config(&dir),
            fallback: Some(memory_config("http://memory.fallback")),
            sync_enabled: true,
            ..Default::default()
        };
        let manager = BackendManager::with_factory(settings, factory).unwrap();
        seed(manager.service().as_ref(), &["a", "b", "c"]).await;

        let report = manager.sync_backends().await;
        assert_eq!(report.synced, 3);
        assert!(report.errors.is_empty(), "{:?}", report.errors);

        for slug in ["a", "b", "c"] {
            let primary = manager.service().get_article(slug).await.unwrap().unwrap();
            let copy = fallback.get_article(slug).await.unwrap().unwrap();
            assert_eq!(copy.content, primary.content);
            assert_eq!(copy.metadata, primary.metadata);
        }
    }

    #[tokio::test]
    async fn test_sync_never_writes_to_primary() {
        let factory = Arc::new(TestFactory::default());
        let primary = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        factory.register("http://primary", Arc::clone(&primary));
        factory.register("http://fallback", Arc::clone(&fallback));
        seed(primary.as_ref(), &["shared"]).await;
        seed(fallback.as_ref(), &["only-in-fallback"]).await;

        let settings = BackendSettings {
            primary: memory_config("http://primary"),
            fallback: Some(memory_config("http://fallback")),
            sync_enabled: true,
            ..Default::default()
        };
        let manager = BackendManager::with_factory(settings, factory).unwrap();

        let report = manager.sync_backends().await;
        assert_eq!(report.synced, 1);
        assert_eq!(primary.len(), 1);
        assert!(primary.get_article("only-in-fallback").await.unwrap().is_none());
        assert_eq!(fallback.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_requires_enabled_flag_and_fallback() {
        let dir = TempDir::new().unwrap();
        let manager = BackendManager::new(settings_with(fs_config(&dir))).unwrap();
        let report = manager.sync_backends().await;
        assert_eq!(report.errors, ["sync is disabled"]);

        manager
            .update_settings(SettingsPatch {
                sync_enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        let report = manager.sync_backends().await;
        assert_eq!(report.errors, ["no fallback backend configured"]);
    }

    #[test]
    fn test_database_config_without_filename_is_rejected() {
        let mut db = DatabaseConfig::sqlite("unused.db");
        db.filename = None;
        let err = BackendManager::new(settings_with(BackendConfig::Database(db)))
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::Configuration(_)));
    }

    #[test]
    fn test_broken_fallback_is_left_unset() {
        let dir = TempDir::new().unwrap();
        let mut db = DatabaseConfig::sqlite("unused.db");
        db.filename = None;
        let settings = BackendSettings {
            primary: fs_config(&dir),
            fallback: Some(BackendConfig::Database(db)),
            ..Default::default()
        };
        let manager = BackendManager::new(settings).unwrap();
        assert!(manager.fallback_service().is_none());
    }

    #[tokio::test]
    async fn test_failed_switch_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("backend.json"));
        let factory = Arc::new(TestFactory::default());
        let unreachable = Arc::new(MemoryBackend::new());
        unreachable.set_simulate_unreachable(true);
        factory.register("http://down", unreachable);

        let original = settings_with(fs_config(&dir));
        store.save(&original).unwrap();
        let manager = BackendManager::with_factory(original.clone(), factory)
            .unwrap()
            .with_store(store.clone());
        let before = manager.service();

        assert!(!manager.switch_backend(memory_config("http://down")).await);
        assert!(Arc::ptr_eq(&before, &manager.service()));
        assert_eq!(manager.settings(), original);
        assert_eq!(store.load().unwrap(), original);
    }

    #[tokio::test]
    async fn test_successful_switch_replaces_service_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("backend.json"));
        let factory = Arc::new(TestFactory::default());
        factory.register("http://up", Arc::new(MemoryBackend::new()));

        let manager = BackendManager::with_factory(settings_with(fs_config(&dir)), factory)
            .unwrap()
            .with_store(store.clone());

        assert!(manager.switch_backend(memory_config("http://up")).await);
        assert_eq!(manager.service().backend_type(), crate::config::BackendType::Memory);
        assert_eq!(manager.settings().primary, memory_config("http://up"));
        assert_eq!(store.load().unwrap().primary, memory_config("http://up"));
    }

    #[tokio::test]
    async fn test_switch_with_unwritable_settings_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let factory = Arc::new(TestFactory::default());
        factory.register("http://up", Arc::new(MemoryBackend::new()));

        let original = settings_with(fs_config(&dir));
        let manager = BackendManager::with_factory(original.clone(), factory)
            .unwrap()
            .with_store(SettingsStore::new(blocker.join("backend.json")));
        let before = manager.service();

        assert!(!manager.switch_backend(memory_config("http://up")).await);
        assert!(Arc::ptr_eq(&before, &manager.service()));
        assert_eq!(manager.settings(), original);
    }

    #[tokio::test]
    async fn test_concurrent_setting_changes_all_persist() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("backend.json"));
        let manager = BackendManager::new(settings_with(fs_config(&dir)))
            .unwrap()
            .with_store(store.clone());

        let migration = crate::config::MigrationSettings {
            batch_size: 42,
            ..Default::default()
        };
        let (first, second) = tokio::join!(
            manager.update_settings(SettingsPatch {
                sync_enabled: Some(true),
                ..Default::default()
            }),
            manager.update_settings(SettingsPatch {
                migration_settings: Some(migration),
                ..Default::default()
            }),
        );
        first.unwrap();
        second.unwrap();

        let saved = store.load().unwrap();
        assert!(saved.sync_enabled);
        assert_eq!(saved.migration_settings.batch_size, 42);
        assert_eq!(saved, manager.settings());
    }

    #[tokio::test]
    async fn test_test_connection_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let manager = BackendManager::new(settings_with(fs_config(&dir))).unwrap();
        let before = manager.service();

        assert!(manager.test_connection(None).await);
        let other = TempDir::new().unwrap();
        assert!(manager.test_connection(Some(&fs_config(&other))).await);
        assert!(
            !manager
                .test_connection(Some(&BackendConfig::Cms(CmsConfig::new(
                    CmsKind::Custom,
                    "http://127.0.0.1:1",
                    ""
                ))))
                .await
        );
        assert!(Arc::ptr_eq(&before, &manager.service()));
    }

    #[tokio::test]
    async fn test_dry_run_migration_is_repeatable_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let manager = BackendManager::new(settings_with(fs_config(&dir))).unwrap();
        seed(manager.service().as_ref(), &["a", "b"]).await;

        let target_path = dir.path().join("target.db");
        let target = BackendConfig::Database(DatabaseConfig::sqlite(&target_path));
        let options = MigrationOptions {
            dry_run: true,
            ..Default::default()
        };

        let first = manager.migrate_to_backend(&target, options.clone()).await;
        let second = manager.migrate_to_backend(&target, options).await;
        assert_eq!(first, second);
        assert_eq!(first.success, 2);
        assert_eq!(first.failed, 0);
        assert!(!target_path.exists());
    }

    #[tokio::test]
    async fn test_migration_to_sqlite_and_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = BackendManager::new(settings_with(fs_config(&dir))).unwrap();
        seed(manager.service().as_ref(), &["a", "b", "c"]).await;
        let target = BackendConfig::Database(DatabaseConfig::sqlite(dir.path().join("t.db")));

        let options = MigrationOptions {
            batch_size: Some(2),
            ..Default::default()
        };
        let report = manager.migrate_to_backend(&target, options.clone()).await;
        assert_eq!(report.success, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);

        let rerun = manager.migrate_to_backend(&target, options).await;
        assert_eq!(rerun.success, 0);
        assert_eq!(rerun.failed, 3);

        let migrated = create_service(&target).unwrap().get_all_articles().await.unwrap();
        assert_eq!(migrated.len(), 3);
    }

    #[tokio::test]
    async fn test_migration_backup_and_cancellation() {
        let dir = TempDir::new().unwrap();
        let manager = BackendManager::new(settings_with(fs_config(&dir))).unwrap();
        seed(manager.service().as_ref(), &["a"]).await;
        let target = BackendConfig::Database(DatabaseConfig::sqlite(dir.path().join("t.db")));

        let missing_dir = manager
            .migrate_to_backend(
                &target,
                MigrationOptions {
                    backup_before: Some(true),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(missing_dir.success, 0);
        assert_eq!(missing_dir.errors.len(), 1);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let backups = dir.path().join("backups");
        let report = manager
            .migrate_to_backend(
                &target,
                MigrationOptions {
                    backup_before: Some(true),
                    backup_dir: Some(backups.clone()),
                    cancel,
                    ..Default::default()
                },
            )
            .await;
        assert!(report.cancelled);
        assert_eq!(report.success, 0);
        assert_eq!(std::fs::read_dir(&backups).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_update_settings_rebuilds_and_merges() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(TestFactory::default());
        factory.register("http://fallback", Arc::new(MemoryBackend::new()));
        let manager = BackendManager::with_factory(settings_with(fs_config(&dir)), factory).unwrap();
        let before = manager.service();

        manager
            .update_settings(SettingsPatch {
                primary: Some(fs_config(&dir)),
                fallback: Some(Some(memory_config("http://fallback"))),
                ..Default::default()
            })
            .await
            .unwrap();
        // Rebuilt even though the config is identical
        assert!(!Arc::ptr_eq(&before, &manager.service()));
        assert!(manager.fallback_service().is_some());

        let mut db = DatabaseConfig::sqlite("unused.db");
        db.filename = None;
        let err = manager
            .update_settings(SettingsPatch {
                fallback: Some(Some(BackendConfig::Database(db))),
                sync_enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
        assert!(!manager.settings().sync_enabled);

        manager
            .update_settings(SettingsPatch {
                fallback: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(manager.fallback_service().is_none());
    }

    #[test]
    fn test_backend_info_is_redacted() {
        let dir = TempDir::new().unwrap();
        let factory = Arc::new(TestFactory::default());
        factory.register("http://fallback", Arc::new(MemoryBackend::new()));
        let settings = BackendSettings {
            primary: fs_config(&dir),
            fallback: Some(memory_config("http://fallback")),
            ..Default::default()
        };
        let manager = BackendManager::with_factory(settings, factory).unwrap();

        let info = manager.backend_info();
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("syncEnabled"));
    }
}
