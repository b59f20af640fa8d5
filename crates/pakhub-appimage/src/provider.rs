use std::path::PathBuf;
use std::sync::Arc;

use pakhub_backend::{BackendError, GemProvider, SoftwareManager};
use pakhub_core::{DatabaseSource, SharedContext};
use pakhub_platform::AppPaths;

use crate::backend::{AppImageBackend, NAME};

/// Upstream archive. Its `*.db` files are SQLite, while records are read as
/// tab-separated text, so deployments point `DATABASE_URL_ENV` at a mirror
/// serving TSV databases.
pub const DATABASE_URL: &str =
    "https://raw.githubusercontent.com/vinifmor/bauh-files/master/appimage/dbs.tar.gz";
pub const DATABASE_URL_ENV: &str = "PAKHUB_APPIMAGE_DB_URL";

fn database_url_with<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(DATABASE_URL_ENV)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DATABASE_URL.to_string())
}

#[derive(Default)]
pub struct AppImageProvider;

impl AppImageProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn db_dir(paths: &AppPaths) -> PathBuf {
        paths.gem_data_dir(NAME).join("db")
    }
}

impl GemProvider for AppImageProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn display_name(&self) -> &'static str {
        "AppImage"
    }

    fn create_manager(
        &self,
        context: Arc<SharedContext>,
    ) -> Result<Box<dyn SoftwareManager>, BackendError> {
        let db_dir = Self::db_dir(&context.paths);
        Ok(Box::new(AppImageBackend::new(context, db_dir)))
    }

    fn database_source(&self, paths: &AppPaths) -> Option<DatabaseSource> {
        let url = database_url_with(|key| std::env::var(key).ok());
        Some(DatabaseSource::new(NAME, url, Self::db_dir(paths)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pakhub_backend::{GemProvider, SoftwareManager as _};
    use pakhub_core::{CacheRegistry, ContextBuilder, TranslationTableBuilder};
    use pakhub_platform::AppPaths;

    use super::{AppImageProvider, DATABASE_URL, DATABASE_URL_ENV, database_url_with};

    #[test]
    fn provider_metadata_is_stable() {
        let provider = AppImageProvider::new();
        let paths = AppPaths::under("/tmp/pakhub");

        assert_eq!(provider.name(), "appimage");
        assert_eq!(provider.display_name(), "AppImage");
        assert_eq!(
            provider.locale_dir(&paths),
            paths.gem_locale_dir("appimage")
        );
    }

    #[test]
    fn database_source_points_at_gem_data_dir() {
        let provider = AppImageProvider::new();
        let paths = AppPaths::under("/tmp/pakhub");

        let source = provider.database_source(&paths).expect("appimage declares a source");

        assert_eq!(source.gem, "appimage");
        assert_eq!(source.db_dir, paths.gem_data_dir("appimage").join("db"));
    }

    #[test]
    fn database_url_can_be_redirected_to_a_mirror() {
        let mirror = "https://mirror.example.org/appimage/dbs.tar.gz";

        assert_eq!(database_url_with(|_| None), DATABASE_URL);
        assert_eq!(database_url_with(|_| Some("  ".to_string())), DATABASE_URL);
        assert_eq!(
            database_url_with(|key| (key == DATABASE_URL_ENV).then(|| mirror.to_string())),
            mirror
        );
    }

    #[test]
    fn create_manager_starts_disabled() {
        let provider = AppImageProvider::new();
        let context = ContextBuilder::new(
            reqwest::Client::new(),
            Arc::new(CacheRegistry::new(Duration::from_secs(60))),
            AppPaths::under("/tmp/pakhub"),
        )
        .build(TranslationTableBuilder::new(None).build());

        let manager = provider.create_manager(context).expect("manager is created");

        assert_eq!(manager.name(), "appimage");
        assert!(!manager.is_enabled());
        assert!(manager.capabilities().supports_search);
    }
}
