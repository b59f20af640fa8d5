use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use pakhub_core::{
    CacheRegistry, CacheSweeper, ContextBuilder, DatabaseSource, DatabaseSynchronizer,
    FileDownloader, IsolatedTask, Isolation, SweeperHandle, SyncToggles, WorkerCommand,
    build_http_client,
};
use pakhub_platform::{AppPaths, AppPathsError, detect_distro};

use crate::registry::{Discovery, PluginRegistry};
use crate::settings::Settings;

pub const SYNC_WORKER_COMMAND: &str = "sync-worker";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error("failed to create application directories: {0}")]
    Dirs(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to start cache sweeper: {0}")]
    Sweeper(#[source] std::io::Error),
    #[error("unknown gem '{0}'")]
    UnknownGem(String),
    #[error("gem '{0}' has no database to synchronize")]
    NoDatabaseSource(String),
}

/// Process-wide pieces every command needs: paths, settings, the shared
/// HTTP client and the cache registry.
pub struct Host {
    pub paths: AppPaths,
    pub settings: Settings,
    pub http_client: reqwest::Client,
    pub caches: Arc<CacheRegistry>,
}

impl Host {
    /// # Errors
    /// Returns an error if the application directories cannot be created or
    /// the HTTP client cannot be built.
    pub fn new(paths: AppPaths, settings: Settings) -> Result<Self, StartupError> {
        paths.ensure_dirs().map_err(StartupError::Dirs)?;
        let http_client = build_http_client(settings.http_timeout())?;
        let caches = Arc::new(CacheRegistry::new(settings.cache_ttl()));
        Ok(Self {
            paths,
            settings,
            http_client,
            caches,
        })
    }

    #[must_use]
    pub fn context_builder(&self) -> ContextBuilder {
        ContextBuilder::new(
            self.http_client.clone(),
            Arc::clone(&self.caches),
            self.paths.clone(),
        )
        .with_icon_ttl(self.settings.icon_cache_ttl())
        .with_disk_cache(self.settings.disk_cache)
        .with_download_icons(self.settings.download_icons)
        .with_distro(detect_distro())
    }

    #[must_use]
    pub fn discover(&self, registry: &PluginRegistry) -> Discovery {
        let locale = self.settings.effective_locale();
        info!("Discovering gems (locale: {})", locale.as_deref().unwrap_or("none"));
        registry.discover(self.context_builder(), locale.as_deref(), &self.settings)
    }

    /// # Errors
    /// Returns an error if the sweeper thread cannot be spawned.
    pub fn start_cache_sweeper(&self) -> Result<SweeperHandle, StartupError> {
        CacheSweeper::new(
            Arc::clone(&self.caches),
            self.settings.cache_sweep_interval(),
        )
        .start()
        .map_err(StartupError::Sweeper)
    }

    /// Start one detached synchronizer for every gem declaring a database
    /// source. Gems whose task cannot be started are logged and skipped.
    #[must_use]
    pub fn start_database_sync(
        &self,
        registry: &PluginRegistry,
        isolation: Isolation,
    ) -> Vec<IsolatedTask> {
        let mut tasks = Vec::new();
        for provider in registry.providers() {
            let Some(source) = provider.database_source(&self.paths) else {
                continue;
            };
            let gem = source.gem;
            let task_name = format!("db-sync-{gem}");

            let spawned = match isolation {
                Isolation::Thread => {
                    let timeout = self.settings.download_timeout();
                    let interval = self.settings.db_sync_interval();
                    let enabled = SyncToggles::updater_enabled(gem);
                    IsolatedTask::spawn_thread(&task_name, move |cancel| async move {
                        if let Err(error) =
                            run_synchronizer(source, timeout, interval, enabled, cancel).await
                        {
                            error!("{gem} database updater could not start: {error}");
                        }
                    })
                }
                Isolation::Process => {
                    match WorkerCommand::current_exe([SYNC_WORKER_COMMAND, gem]) {
                        Ok(command) => IsolatedTask::spawn_process(&task_name, &command),
                        Err(error) => {
                            warn!("Cannot locate the pakhub binary for {task_name}: {error}");
                            continue;
                        }
                    }
                }
            };

            match spawned {
                Ok(task) => tasks.push(task),
                Err(error) => warn!("Could not start {task_name}: {error}"),
            }
        }
        tasks
    }

    /// Database source of `gem`, for the subprocess worker.
    ///
    /// # Errors
    /// Returns an error if the gem is not compiled in or declares no source.
    pub fn database_source(
        &self,
        registry: &PluginRegistry,
        gem: &str,
    ) -> Result<DatabaseSource, StartupError> {
        let provider = registry
            .provider(gem)
            .ok_or_else(|| StartupError::UnknownGem(gem.to_string()))?;
        provider
            .database_source(&self.paths)
            .ok_or_else(|| StartupError::NoDatabaseSource(gem.to_string()))
    }
}

/// Run a synchronizer with its own HTTP client until `cancel` fires.
///
/// The client is built here so it belongs to the runtime driving the loop.
/// `download_timeout` bounds a whole archive transfer, which is far larger
/// than the queries the shared client makes.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub async fn run_synchronizer(
    source: DatabaseSource,
    download_timeout: Duration,
    interval: Duration,
    enabled: bool,
    cancel: CancellationToken,
) -> Result<(), StartupError> {
    let client = build_http_client(download_timeout)?;
    let synchronizer = DatabaseSynchronizer::new(source, Arc::new(FileDownloader::new(client)))
        .with_interval(interval)
        .with_enabled(enabled);
    synchronizer.run(cancel).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use pakhub_backend::{
        BackendError, GemProvider, ManagerCapabilities, Package, SoftwareManager,
    };
    use pakhub_core::{DatabaseSource, Isolation, SharedContext};
    use pakhub_platform::AppPaths;
    use tokio_util::sync::CancellationToken;

    use super::{Host, StartupError, run_synchronizer};
    use crate::gem_slots::GemSlot;
    use crate::registry::PluginRegistry;
    use crate::settings::Settings;

    struct Inert;

    #[async_trait]
    impl SoftwareManager for Inert {
        fn name(&self) -> &'static str {
            "synced"
        }

        fn capabilities(&self) -> ManagerCapabilities {
            ManagerCapabilities::default()
        }

        fn is_enabled(&self) -> bool {
            false
        }

        fn set_enabled(&mut self, _enabled: bool) {}

        fn is_default_enabled(&self) -> bool {
            false
        }

        async fn search(&self, _query: &str) -> Result<Vec<Package>, BackendError> {
            Ok(Vec::new())
        }

        async fn list_installed(&self) -> Result<Vec<Package>, BackendError> {
            Ok(Vec::new())
        }

        async fn install(&self, _package: &Package) -> Result<(), BackendError> {
            Ok(())
        }

        async fn uninstall(&self, _package: &Package) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct SourceProvider {
        name: &'static str,
        with_source: bool,
    }

    impl GemProvider for SourceProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn display_name(&self) -> &'static str {
            self.name
        }

        fn create_manager(
            &self,
            _context: Arc<SharedContext>,
        ) -> Result<Box<dyn SoftwareManager>, BackendError> {
            Ok(Box::new(Inert))
        }

        fn database_source(&self, paths: &AppPaths) -> Option<DatabaseSource> {
            self.with_source.then(|| {
                DatabaseSource::new(
                    self.name,
                    "http://127.0.0.1:9/dbs.tar.gz",
                    paths.gem_data_dir(self.name),
                )
            })
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::with_slots(vec![
            GemSlot::present(Arc::new(SourceProvider {
                name: "synced",
                with_source: true,
            })),
            GemSlot::present(Arc::new(SourceProvider {
                name: "plain",
                with_source: false,
            })),
        ])
    }

    fn host(root: &std::path::Path) -> Host {
        Host::new(AppPaths::under(root), Settings::default()).expect("host should start")
    }

    #[test]
    fn host_creates_directories_and_configures_context() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let host = host(temp.path());

        assert!(temp.path().join("config").is_dir());
        assert!(temp.path().join("data").is_dir());

        let context = host.context_builder().build(Default::default());
        assert_eq!(context.icon_cache.ttl(), Settings::default().icon_cache_ttl());
        assert_eq!(host.caches.default_ttl(), Settings::default().cache_ttl());
    }

    #[test]
    fn database_source_lookup_reports_unknown_and_sourceless_gems() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let host = host(temp.path());
        let registry = registry();

        let source = host
            .database_source(&registry, "synced")
            .expect("synced declares a source");
        assert_eq!(source.db_dir, PathBuf::from(temp.path()).join("data/gems/synced"));
        assert!(matches!(
            host.database_source(&registry, "plain"),
            Err(StartupError::NoDatabaseSource(ref gem)) if gem == "plain"
        ));
        assert!(matches!(
            host.database_source(&registry, "missing"),
            Err(StartupError::UnknownGem(_))
        ));
    }

    #[test]
    fn thread_sync_tasks_start_only_for_declared_sources_and_stop_on_shutdown() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let host = host(temp.path());

        let mut tasks = host.start_database_sync(&registry(), Isolation::Thread);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name(), "db-sync-synced");
        assert_eq!(tasks[0].isolation(), Isolation::Thread);
        for task in &mut tasks {
            task.shutdown();
            assert!(task.is_finished());
        }
    }

    #[tokio::test]
    async fn disabled_synchronizer_returns_immediately() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let source = DatabaseSource::new("synced", "http://127.0.0.1:9/dbs.tar.gz", temp.path());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_synchronizer(
                source,
                Duration::from_secs(1),
                Duration::from_secs(60),
                false,
                CancellationToken::new(),
            ),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
