//! Process-wide logging through `simplelog`.
//!
//! The host and each sync worker subprocess write to their own file under
//! `<data>/logs`, so concurrent processes never interleave lines.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{LevelFilter, info};
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, SharedLogger, WriteLogger};

use pakhub_platform::AppPaths;

/// Which process is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole<'a> {
    Host,
    SyncWorker(&'a str),
}

impl LogRole<'_> {
    #[must_use]
    pub fn log_file(self, paths: &AppPaths) -> PathBuf {
        match self {
            Self::Host => paths.log_file(),
            Self::SyncWorker(gem) => paths.worker_log_file(gem),
        }
    }
}

/// Append-only log file that is reopened when it disappears from disk.
struct ReopeningFile {
    path: PathBuf,
    file: Option<File>,
}

impl ReopeningFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    fn current(&mut self) -> io::Result<&mut File> {
        if !self.path.exists() {
            self.file = None;
        }
        let file = match self.file.take() {
            Some(file) => file,
            None => open_append(&self.path)?,
        };
        Ok(self.file.insert(file))
    }
}

impl Write for ReopeningFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Once the file exceeds `max_size`, keep roughly its newest `max_size / 2`
/// bytes, starting at a line boundary. Returns whether the file was cut.
fn shrink_log(path: &Path, max_size: u64) -> io::Result<bool> {
    let len = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if len <= max_size {
        return Ok(false);
    }

    let contents = std::fs::read(path)?;
    let keep = usize::try_from(max_size / 2)
        .unwrap_or(usize::MAX)
        .min(contents.len());
    let cut = contents.len() - keep;
    let start = contents[cut..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(contents.len(), |pos| cut + pos + 1);
    std::fs::write(path, &contents[start..])?;
    Ok(true)
}

/// Install the global logger for `role`. Failing to open the log file only
/// loses file output; the process keeps running.
pub fn init_logging(paths: &AppPaths, role: LogRole<'_>, debug_enabled: bool, max_size: u64) {
    let log_path = role.log_file(paths);
    let trimmed = shrink_log(&log_path, max_size).unwrap_or(false);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("pakhub")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if let Ok(writer) = ReopeningFile::open(log_path.clone()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config.clone(), writer));
    }

    #[cfg(debug_assertions)]
    if role == LogRole::Host {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            config,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_logging_enabled(debug_enabled);

    if trimmed {
        info!("Trimmed oversized log {}", log_path.display());
    }
    if debug_enabled {
        info!("Debug logging to {}", log_path.display());
    }
}

/// Warnings and errors are always kept; `enabled` adds debug output.
pub fn set_logging_enabled(enabled: bool) {
    log::set_max_level(if enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    });
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pakhub_platform::AppPaths;

    use super::{LogRole, ReopeningFile, set_logging_enabled, shrink_log};

    #[test]
    fn roles_log_to_separate_files() {
        let paths = AppPaths::under("/tmp/pakhub");

        assert_eq!(LogRole::Host.log_file(&paths), paths.log_file());
        assert_eq!(
            LogRole::SyncWorker("appimage").log_file(&paths),
            paths.worker_log_file("appimage")
        );
    }

    #[test]
    fn writer_reopens_deleted_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("logs").join("pakhub.log");
        let mut writer = ReopeningFile::open(log_path.clone()).expect("log file should open");

        writer.write_all(b"cycle 1\n").expect("first write");
        std::fs::remove_dir_all(temp.path().join("logs")).expect("log dir removable");
        writer.write_all(b"cycle 2\n").expect("write after deletion");
        writer.flush().expect("flush");

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("recreated log readable"),
            "cycle 2\n"
        );
    }

    #[test]
    fn shrink_keeps_newest_whole_lines() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("pakhub.log");
        std::fs::write(&log_path, "sync-1\nsync-2\nsync-3\nsync-4\nsync-5\n").expect("log");

        assert!(shrink_log(&log_path, 20).expect("shrink should succeed"));

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log readable"),
            "sync-5\n"
        );
    }

    #[test]
    fn shrink_ignores_small_and_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("pakhub.log");

        assert!(!shrink_log(&log_path, 10).expect("missing file is fine"));

        std::fs::write(&log_path, "short\n").expect("log");
        assert!(!shrink_log(&log_path, 1024).expect("small file is fine"));
        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log readable"),
            "short\n"
        );
    }

    #[test]
    fn logging_switch_keeps_warnings() {
        set_logging_enabled(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_logging_enabled(false);
        assert_eq!(log::max_level(), log::LevelFilter::Warn);
    }
}
