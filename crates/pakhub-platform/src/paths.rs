use std::path::PathBuf;
use thiserror::Error;

const APP_DIR_NAME: &str = "pakhub";
const RESOURCE_DIR_ENV: &str = "PAKHUB_RESOURCE_DIR";

/// The platform has no per-user directory of the given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no user {kind} directory on this system")]
pub struct AppPathsError {
    pub kind: &'static str,
}

fn user_dir(base: Option<PathBuf>, kind: &'static str) -> Result<PathBuf, AppPathsError> {
    base.map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(AppPathsError { kind })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Root of the bundled resources; each gem keeps its locale files under
    /// `gems/<gem>/locale` here.
    pub resource_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current user.
    ///
    /// The resource root can be overridden with `PAKHUB_RESOURCE_DIR`.
    ///
    /// # Errors
    /// Returns an error when a required base directory (config, cache or data)
    /// cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let config_dir = user_dir(dirs::config_dir(), "config")?;
        let cache_dir = user_dir(dirs::cache_dir(), "cache")?;
        let data_dir = user_dir(dirs::data_dir(), "data")?;
        let resource_dir = std::env::var_os(RESOURCE_DIR_ENV)
            .map_or_else(|| data_dir.join("resources"), PathBuf::from);

        Ok(Self {
            config_dir,
            cache_dir,
            data_dir,
            resource_dir,
        })
    }

    /// Lay every directory out under a single root. Used by tests and by
    /// portable installs.
    #[must_use]
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
            resource_dir: root.join("resources"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Log of the foreground host process.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("pakhub.log")
    }

    /// Log of one gem's database sync worker subprocess.
    #[must_use]
    pub fn worker_log_file(&self, gem: &str) -> PathBuf {
        self.log_dir().join(format!("sync-{gem}.log"))
    }

    #[must_use]
    pub fn gem_data_dir(&self, gem: &str) -> PathBuf {
        self.data_dir.join("gems").join(gem)
    }

    #[must_use]
    pub fn gem_locale_dir(&self, gem: &str) -> PathBuf {
        self.resource_dir.join("gems").join(gem).join("locale")
    }

    /// Create every writable directory. The resource root is read-only and
    /// left alone.
    ///
    /// # Errors
    /// Returns the first directory that cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.config_dir,
            &self.cache_dir,
            &self.data_dir,
            &self.log_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
