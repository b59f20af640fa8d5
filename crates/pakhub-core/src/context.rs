use std::sync::Arc;
use std::time::Duration;

use pakhub_platform::{AppPaths, DistroId};

use crate::cache::{CacheRegistry, ExpiringCache};
use crate::downloader::FileDownloader;
use crate::i18n::TranslationTable;

/// Everything a backend receives at construction. Built once, after locale
/// discovery has finished, and shared read-only afterwards.
#[derive(Clone)]
pub struct SharedContext {
    pub i18n: TranslationTable,
    pub http_client: reqwest::Client,
    pub caches: Arc<CacheRegistry>,
    /// Icon bytes keyed by URL.
    pub icon_cache: ExpiringCache<String, Vec<u8>>,
    pub disk_cache: bool,
    pub download_icons: bool,
    pub paths: AppPaths,
    pub distro: DistroId,
    pub downloader: FileDownloader,
}

/// The [`SharedContext`] minus its translation table.
pub struct ContextBuilder {
    http_client: reqwest::Client,
    caches: Arc<CacheRegistry>,
    icon_ttl: Option<Duration>,
    disk_cache: bool,
    download_icons: bool,
    paths: AppPaths,
    distro: DistroId,
}

impl ContextBuilder {
    #[must_use]
    pub fn new(http_client: reqwest::Client, caches: Arc<CacheRegistry>, paths: AppPaths) -> Self {
        Self {
            http_client,
            caches,
            icon_ttl: None,
            disk_cache: true,
            download_icons: true,
            paths,
            distro: DistroId::unknown(),
        }
    }

    /// Icon cache lifetime; the registry default applies when unset.
    #[must_use]
    pub fn with_icon_ttl(mut self, ttl: Duration) -> Self {
        self.icon_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_disk_cache(mut self, enabled: bool) -> Self {
        self.disk_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_download_icons(mut self, enabled: bool) -> Self {
        self.download_icons = enabled;
        self
    }

    #[must_use]
    pub fn with_distro(mut self, distro: DistroId) -> Self {
        self.distro = distro;
        self
    }

    #[must_use]
    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    #[must_use]
    pub fn build(self, i18n: TranslationTable) -> Arc<SharedContext> {
        let downloader = FileDownloader::new(self.http_client.clone());
        let icon_cache = match self.icon_ttl {
            Some(ttl) => self.caches.new_cache(ttl),
            None => self.caches.new_default_cache(),
        };
        Arc::new(SharedContext {
            i18n,
            http_client: self.http_client,
            caches: self.caches,
            icon_cache,
            disk_cache: self.disk_cache,
            download_icons: self.download_icons,
            paths: self.paths,
            distro: self.distro,
            downloader,
        })
    }
}
