//! Shared runtime pieces for pakhub.
//!
//! This crate holds everything backends and the host share, independent of
//! any concrete packaging backend:
//! - Expiring in-memory caches with a central sweeper.
//! - Translation tables assembled from per-gem locale files.
//! - The immutable context handed to every backend.
//! - File downloads over the shared HTTP client.
//! - Background database synchronization with per-file locking.
//! - Isolated background tasks (thread or subprocess).

pub mod cache;
mod context;
mod downloader;
pub mod i18n;
pub mod sync;
pub mod task;

/// Expiring caches, their registry and the sweeper thread.
pub use cache::{CacheRegistry, CacheSweeper, ExpiringCache, SweepReport, SweeperHandle};
/// Immutable backend context and the builder producing it.
pub use context::{ContextBuilder, SharedContext};
/// HTTP client construction and streaming file downloads.
pub use downloader::{DownloadError, FileDownloader, build_http_client};
/// Locale merge pipeline.
pub use i18n::{LocaleError, TranslationTable, TranslationTableBuilder};
/// Database archive synchronization.
pub use sync::{
    ArchiveFetcher, CycleOutcome, DatabaseSource, DatabaseSynchronizer, SyncState, SyncToggles,
};
/// Background task isolation strategies.
pub use task::{IsolatedTask, Isolation, TaskError, WorkerCommand};
