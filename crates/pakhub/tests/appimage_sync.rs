#![cfg(feature = "appimage")]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pakhub::{AggregateManager, PluginRegistry, Settings};
use pakhub_core::sync::lock::read_locked;
use pakhub_core::{
    ArchiveFetcher, CacheRegistry, ContextBuilder, CycleOutcome, DatabaseSource,
    DatabaseSynchronizer, DownloadError,
};
use pakhub_platform::AppPaths;

struct LocalArchive(std::path::PathBuf);

#[async_trait]
impl ArchiveFetcher for LocalArchive {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).expect("staging dir");
        }
        std::fs::copy(&self.0, dest).map_err(|source| DownloadError::Io {
            context: "copy local archive",
            path: dest.to_path_buf(),
            source,
        })
    }
}

fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("archive file should be created");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .expect("tar entry should be appended");
    }
    builder
        .into_inner()
        .expect("tar stream should finish")
        .finish()
        .expect("gzip stream should finish");
}

#[tokio::test]
async fn synchronized_archive_is_searchable_through_the_aggregate() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let paths = AppPaths::under(temp.path());
    let registry = PluginRegistry::builtin();
    let provider = registry.provider("appimage").expect("appimage is compiled in");
    let source = provider
        .database_source(&paths)
        .expect("appimage declares a database");

    std::fs::create_dir_all(&source.db_dir).expect("db dir");
    for stale in ["a.db", "b.db", "c.db"] {
        std::fs::write(source.db_dir.join(stale), "stale\t0.1\n").expect("stale db");
    }
    let archive = temp.path().join("dbs.tar.gz");
    write_tar_gz(
        &archive,
        &[
            ("a.db", "krita\t5.2.0\tDigital painting\n"),
            ("b.db", "inkscape\t1.3\tVector graphics\n"),
        ],
    );

    let synchronizer = DatabaseSynchronizer::new(source.clone(), Arc::new(LocalArchive(archive)));
    assert_eq!(
        synchronizer.run_cycle().await,
        CycleOutcome::Updated {
            removed: 3,
            installed: 2
        }
    );
    assert!(!source.db_dir.join("c.db").exists());

    let settings = Settings {
        enabled_gems: Some(["appimage".to_string()].into()),
        ..Settings::default()
    };
    let builder = ContextBuilder::new(
        reqwest::Client::new(),
        Arc::new(CacheRegistry::new(Duration::from_secs(60))),
        paths,
    );
    let discovery = registry.discover(builder, None, &settings);
    let aggregate = AggregateManager::new(discovery.managers);

    let result = aggregate.search("graphics").await;
    let ids: Vec<&str> = result.items.iter().map(|package| package.id.as_str()).collect();
    assert_eq!(ids, vec!["inkscape"]);
    assert!(result.failures.is_empty());
    assert!(aggregate.search("stale").await.items.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readers_never_observe_a_half_swapped_database() {
    let temp = tempfile::tempdir().expect("tempdir should be created");
    let db_dir = temp.path().join("appimage");
    std::fs::create_dir_all(&db_dir).expect("db dir");

    let old = "krita\t5.2.0\tDigital painting\n".repeat(20_000);
    let new = "inkscape\t1.3\tVector graphics\n".repeat(20_000);
    std::fs::write(db_dir.join("apps.db"), &old).expect("initial db");
    let old_archive = temp.path().join("old.tar.gz");
    let new_archive = temp.path().join("new.tar.gz");
    write_tar_gz(&old_archive, &[("apps.db", old.as_str())]);
    write_tar_gz(&new_archive, &[("apps.db", new.as_str())]);

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let stop = Arc::clone(&stop);
        let db = db_dir.join("apps.db");
        let (old, new) = (old.clone(), new.clone());
        std::thread::spawn(move || {
            let (mut reads, mut torn) = (0_usize, Vec::new());
            while !stop.load(Ordering::SeqCst) {
                if let Some(bytes) = read_locked(&db).expect("locked read should not error") {
                    if bytes != old.as_bytes() && bytes != new.as_bytes() {
                        torn.push(bytes.len());
                    }
                }
                reads += 1;
            }
            (reads, torn)
        })
    };

    for cycle in 0..10 {
        let archive = if cycle % 2 == 0 { &new_archive } else { &old_archive };
        let source = DatabaseSource::new("appimage", "https://example.org/dbs.tar.gz", &db_dir);
        let synchronizer =
            DatabaseSynchronizer::new(source, Arc::new(LocalArchive(archive.clone())));
        assert!(matches!(
            synchronizer.run_cycle().await,
            CycleOutcome::Updated { installed: 1, .. }
        ));
    }
    stop.store(true, Ordering::SeqCst);
    let (reads, torn) = reader.join().expect("reader thread should finish");

    assert!(reads > 0);
    assert!(torn.is_empty(), "reads matching neither database: {torn:?}");
    assert_eq!(
        std::fs::read_to_string(db_dir.join("apps.db")).expect("final db"),
        old
    );
}
