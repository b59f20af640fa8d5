use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use pakhub_backend::{BackendError, ManagerCapabilities, Package, SoftwareManager};
use pakhub_core::{ExpiringCache, SharedContext};

use crate::database::{AppRecord, load_records, parse_installed_records, search_records};

pub(crate) const NAME: &str = "appimage";
const INSTALLED_REGISTRY: &str = "installed.tsv";

/// Reads the synchronized AppImage catalogue. Installing is left to the
/// user's AppImage tooling; this backend only searches and reports.
pub struct AppImageBackend {
    context: Arc<SharedContext>,
    db_dir: PathBuf,
    installed_registry: PathBuf,
    enabled: bool,
    search_cache: ExpiringCache<String, Vec<Package>>,
}

impl AppImageBackend {
    #[must_use]
    pub fn new(context: Arc<SharedContext>, db_dir: PathBuf) -> Self {
        let installed_registry = context.paths.gem_data_dir(NAME).join(INSTALLED_REGISTRY);
        let search_cache = context.caches.new_default_cache();
        Self {
            context,
            db_dir,
            installed_registry,
            enabled: false,
            search_cache,
        }
    }

    #[must_use]
    pub fn db_dir(&self) -> &std::path::Path {
        &self.db_dir
    }

    fn installed_versions(&self) -> Result<HashMap<String, String>, BackendError> {
        match std::fs::read_to_string(&self.installed_registry) {
            Ok(content) => Ok(parse_installed_records(&content).into_iter().collect()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn to_package(record: AppRecord, installed: &HashMap<String, String>) -> Package {
        let package = Package::new(NAME, record.name.clone()).with_latest_version(record.version);
        let package = match record.description {
            Some(description) => package.with_description(description),
            None => package,
        };
        match installed.get(&record.name) {
            Some(version) => package.with_version(version.clone()).installed(true),
            None => package,
        }
    }

    async fn records(&self) -> Result<Vec<AppRecord>, BackendError> {
        let db_dir = self.db_dir.clone();
        tokio::task::spawn_blocking(move || load_records(&db_dir))
            .await
            .map_err(|error| BackendError::internal("read databases", error))?
    }
}

#[async_trait]
impl SoftwareManager for AppImageBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> ManagerCapabilities {
        ManagerCapabilities {
            supports_search: true,
            ..ManagerCapabilities::default()
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_default_enabled(&self) -> bool {
        cfg!(target_os = "linux")
    }

    async fn prepare(&self) -> Result<(), BackendError> {
        std::fs::create_dir_all(&self.db_dir)?;
        info!(
            "{} ready, databases in {}",
            self.context.i18n.tr("gem.appimage.label"),
            self.db_dir.display()
        );
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<Package>, BackendError> {
        let key = query.trim().to_lowercase();
        if let Some(cached) = self.search_cache.get(&key) {
            debug!("AppImage search cache hit for '{key}'");
            return Ok(cached);
        }

        let installed = self.installed_versions()?;
        let packages: Vec<Package> = search_records(self.records().await?, &key)
            .into_iter()
            .map(|record| Self::to_package(record, &installed))
            .collect();
        self.search_cache.put(key, packages.clone());
        Ok(packages)
    }

    async fn list_installed(&self) -> Result<Vec<Package>, BackendError> {
        let installed = self.installed_versions()?;
        if installed.is_empty() {
            return Ok(Vec::new());
        }

        let latest: HashMap<String, AppRecord> = self
            .records()
            .await?
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        let mut packages: Vec<Package> = installed
            .iter()
            .map(|(name, version)| {
                let package = Package::new(NAME, name.clone())
                    .with_version(version.clone())
                    .installed(true);
                match latest.get(name) {
                    Some(record) => package.with_latest_version(record.version.clone()),
                    None => package,
                }
            })
            .collect();
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packages)
    }

    async fn install(&self, _package: &Package) -> Result<(), BackendError> {
        Err(BackendError::unsupported("install"))
    }

    async fn uninstall(&self, _package: &Package) -> Result<(), BackendError> {
        Err(BackendError::unsupported("uninstall"))
    }
}
