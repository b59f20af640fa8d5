use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// `None` lets every gem apply its own default policy.
    #[serde(default)]
    pub enabled_gems: Option<BTreeSet<String>>,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_icon_cache_ttl")]
    pub icon_cache_ttl_secs: u64,

    #[serde(default = "default_cache_sweep_interval")]
    pub cache_sweep_interval_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default = "default_true")]
    pub disk_cache: bool,

    #[serde(default = "default_true")]
    pub download_icons: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_db_sync_interval")]
    pub db_sync_interval_secs: u64,

    /// Whole-transfer limit for database archive downloads.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

const MIN_DB_SYNC_INTERVAL_SECS: u64 = 60;

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    60 * 60
}

fn default_icon_cache_ttl() -> u64 {
    5 * 60
}

fn default_cache_sweep_interval() -> u64 {
    15
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_db_sync_interval() -> u64 {
    20 * 60
}

fn default_download_timeout() -> u64 {
    10 * 60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled_gems: None,
            cache_ttl_secs: default_cache_ttl(),
            icon_cache_ttl_secs: default_icon_cache_ttl(),
            cache_sweep_interval_secs: default_cache_sweep_interval(),
            http_timeout_secs: default_http_timeout(),
            locale: None,
            disk_cache: true,
            download_icons: true,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            db_sync_interval_secs: default_db_sync_interval(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl Settings {
    /// Missing or malformed files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring malformed settings {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Like [`Settings::load_from`], but a missing file is written with the
    /// defaults so there is something to edit.
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        if let Err(error) = settings.save_to(path) {
            log::warn!("Could not write default settings: {error}");
        }
        settings
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                context: "failed to create settings directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| SettingsError::Io {
            context: "failed to write settings",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Explicit gem choice, or `None` when defaults apply.
    pub fn gem_enabled(&self, gem: &str) -> Option<bool> {
        self.enabled_gems.as_ref().map(|gems| gems.contains(gem))
    }

    /// The configured locale, else the one from `LC_ALL`, `LC_MESSAGES` or
    /// `LANG`.
    pub fn effective_locale(&self) -> Option<String> {
        self.effective_locale_with(|key| std::env::var(key).ok())
    }

    fn effective_locale_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.locale.clone().or_else(|| {
            ["LC_ALL", "LC_MESSAGES", "LANG"]
                .into_iter()
                .filter_map(&lookup)
                .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn icon_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.icon_cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Never shorter than a minute, so a zero setting cannot turn the
    /// updater into a download loop.
    pub fn db_sync_interval(&self) -> Duration {
        Duration::from_secs(self.db_sync_interval_secs.max(MIN_DB_SYNC_INTERVAL_SECS))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs.max(1))
    }
}
