//! Background synchronization of remote database archives.
//!
//! A [`DatabaseSynchronizer`] periodically downloads a compressed archive,
//! deletes the backend's current `*.db` files and installs the archive's
//! files in their place, taking the per-file lock from [`lock`] for every
//! delete and every install. Network failures are logged and retried on the
//! next cycle; the loop only ends when it is cancelled.

pub mod archive;
pub mod lock;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::downloader::{DownloadError, FileDownloader};
use crate::task::Isolation;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(20 * 60);
pub const DATABASE_EXTENSION: &str = "db";

const STAGING_ARCHIVE_NAME: &str = ".db-archive.download";
const DEBUG_ENV: &str = "PAKHUB_DEBUG";

/// Where a backend's database archive comes from and where it is unpacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSource {
    pub gem: &'static str,
    pub url: String,
    pub db_dir: PathBuf,
}

impl DatabaseSource {
    #[must_use]
    pub fn new(gem: &'static str, url: impl Into<String>, db_dir: impl Into<PathBuf>) -> Self {
        Self {
            gem,
            url: url.into(),
            db_dir: db_dir.into(),
        }
    }

    #[must_use]
    pub fn staging_archive(&self) -> PathBuf {
        self.db_dir.join(STAGING_ARCHIVE_NAME)
    }

    /// Current `*.db` files, nested ones included, sorted by path. A missing
    /// directory yields an empty list.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be listed.
    pub fn database_files(&self) -> std::io::Result<Vec<PathBuf>> {
        list_database_files(&self.db_dir)
    }
}

/// `*.db` files under `dir` and its subdirectories, sorted by path. Hidden
/// directories (lock sidecars, extraction staging) are skipped.
///
/// # Errors
/// Returns an error if `dir` or one of its subdirectories exists but cannot
/// be listed.
pub fn list_database_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_database_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_database_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    };

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if !entry.file_name().to_string_lossy().starts_with('.') {
                collect_database_files(&path, files)?;
            }
        } else if file_type.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == DATABASE_EXTENSION)
        {
            files.push(path);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disabled,
    Idle,
    Fetching,
    Swapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The archive could not be fetched; local files were left untouched.
    FetchFailed,
    Updated { removed: usize, installed: usize },
    /// Old files were removed but the archive could not be installed.
    ExtractFailed { removed: usize },
}

/// Source of database archives. [`FileDownloader`] is the production
/// implementation.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

#[async_trait]
impl ArchiveFetcher for FileDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.download(url, dest).await
    }
}

/// Process-level switches read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncToggles {
    pub debug: bool,
}

impl SyncToggles {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            debug: flag(lookup(DEBUG_ENV).as_deref(), false),
        }
    }

    /// Debug runs keep the synchronizer in-process so it shows up in the
    /// same log and debugger session.
    #[must_use]
    pub fn isolation(self) -> Isolation {
        if self.debug {
            Isolation::Thread
        } else {
            Isolation::Process
        }
    }

    /// Whether the updater of `gem` is enabled (`PAKHUB_<GEM>_DB_UPDATER`,
    /// on unless set to `0`).
    #[must_use]
    pub fn updater_enabled(gem: &str) -> bool {
        Self::updater_enabled_with(gem, |key| std::env::var(key).ok())
    }

    pub fn updater_enabled_with<F>(gem: &str, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        flag(lookup(&updater_env_key(gem)).as_deref(), true)
    }
}

#[must_use]
pub fn updater_env_key(gem: &str) -> String {
    format!("PAKHUB_{}_DB_UPDATER", gem.to_ascii_uppercase())
}

fn flag(value: Option<&str>, default: bool) -> bool {
    match value.map(str::trim) {
        Some(value) => value
            .parse::<i64>()
            .map_or_else(|_| value.eq_ignore_ascii_case("true"), |number| number != 0),
        None => default,
    }
}

pub struct DatabaseSynchronizer {
    source: DatabaseSource,
    fetcher: Arc<dyn ArchiveFetcher>,
    interval: Duration,
    enabled: bool,
    state: watch::Sender<SyncState>,
    last_updated: watch::Sender<Option<DateTime<Utc>>>,
}

impl DatabaseSynchronizer {
    #[must_use]
    pub fn new(source: DatabaseSource, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        let (last_updated, _) = watch::channel(None);
        Self {
            source,
            fetcher,
            interval: DEFAULT_SYNC_INTERVAL,
            enabled: true,
            state,
            last_updated,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn source(&self) -> &DatabaseSource {
        &self.source
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// When the last cycle finished installing a fresh archive.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Run cycles until `cancel` fires. Returns immediately when disabled.
    pub async fn run(&self, cancel: CancellationToken) {
        if !self.enabled {
            warn!("{} database updater disabled", self.source.gem);
            self.state.send_replace(SyncState::Disabled);
            return;
        }

        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };
            info!("{} database cycle finished: {outcome:?}", self.source.gem);

            info!("Sleeping");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        match self.last_updated() {
            Some(at) => info!(
                "{} database updater stopped (last update {})",
                self.source.gem,
                at.to_rfc3339()
            ),
            None => info!("{} database updater stopped", self.source.gem),
        }
        self.state.send_replace(SyncState::Idle);
    }

    /// One fetch → delete → install → cleanup pass.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let gem = self.source.gem;
        self.state.send_replace(SyncState::Fetching);
        info!("Retrieving {gem} databases");

        let staging = self.source.staging_archive();
        match self.fetcher.fetch(&self.source.url, &staging).await {
            Ok(bytes) => info!("Database file saved at {} ({bytes} bytes)", staging.display()),
            Err(error) => {
                if error.is_connectivity() {
                    warn!("The internet connection seems to be off: {error}");
                } else {
                    warn!("Could not download the database file {}: {error}", self.source.url);
                }
                let _ = std::fs::remove_file(&staging);
                self.state.send_replace(SyncState::Idle);
                return CycleOutcome::FetchFailed;
            }
        }

        self.state.send_replace(SyncState::Swapping);
        let outcome = swap_databases(&self.source, &staging);
        if matches!(outcome, CycleOutcome::Updated { .. }) {
            self.last_updated.send_replace(Some(Utc::now()));
        }
        self.state.send_replace(SyncState::Idle);
        outcome
    }
}

fn swap_databases(source: &DatabaseSource, archive_path: &Path) -> CycleOutcome {
    let removed = remove_old_databases(source);

    info!("Uncompressing {}", archive_path.display());
    let outcome = match archive::install_archive(archive_path, &source.db_dir) {
        Ok(installed) => {
            info!("Successfully uncompressed file {}", archive_path.display());
            CycleOutcome::Updated { removed, installed }
        }
        Err(error) => {
            error!("Could not extract file {}: {error}", archive_path.display());
            CycleOutcome::ExtractFailed { removed }
        }
    };

    info!("Deleting {}", archive_path.display());
    match std::fs::remove_file(archive_path) {
        Ok(()) => info!("Successfully removed {}", archive_path.display()),
        Err(error) => warn!("Could not remove {}: {error}", archive_path.display()),
    }

    outcome
}

fn remove_old_databases(source: &DatabaseSource) -> usize {
    let old_files = match source.database_files() {
        Ok(files) => files,
        Err(error) => {
            warn!("Could not list {}: {error}", source.db_dir.display());
            return 0;
        }
    };
    if old_files.is_empty() {
        return 0;
    }

    info!("Deleting old database files");
    let mut removed = 0;
    for file in &old_files {
        match lock::remove_locked(file) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(error) => warn!("Could not delete {}: {error}", file.display()),
        }
    }
    info!("Old database files deleted");
    removed
}
