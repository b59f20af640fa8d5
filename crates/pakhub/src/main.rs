use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use pakhub::aggregate::{AggregateManager, FanOut};
use pakhub::cli::{Cli, Command};
use pakhub::logging::{LogRole, init_logging};
use pakhub::startup::run_synchronizer;
use pakhub::{Host, PluginRegistry, Settings, StartupError};
use pakhub_backend::Package;
use pakhub_core::SyncToggles;
use pakhub_platform::AppPaths;

#[tokio::main]
async fn main() -> ExitCode {
    let Cli { command } = Cli::parse();

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("pakhub: {error}");
            return ExitCode::FAILURE;
        }
    };
    let settings = Settings::load_or_create(&paths.settings_file());
    let role = match &command {
        Command::SyncWorker { gem } => LogRole::SyncWorker(gem),
        _ => LogRole::Host,
    };
    init_logging(
        &paths,
        role,
        settings.debug_logging,
        settings.max_log_size_bytes,
    );

    match run(command, paths, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            eprintln!("pakhub: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, paths: AppPaths, settings: Settings) -> Result<(), StartupError> {
    let host = Host::new(paths, settings)?;
    let registry = PluginRegistry::builtin();

    if let Command::SyncWorker { gem } = &command {
        return sync_worker(&host, &registry, gem).await;
    }

    let discovery = host.discover(&registry);
    let aggregate = AggregateManager::new(discovery.managers);

    match command {
        Command::Gems => {
            let i18n = &discovery.context.i18n;
            for status in aggregate.gem_statuses() {
                let description_key = format!("gem.{}.description", status.name);
                let label = registry
                    .provider(status.name)
                    .map_or(status.name, |provider| provider.display_name());
                println!(
                    "{label:<10} {:<8} (default: {})  {}",
                    if status.enabled { "enabled" } else { "disabled" },
                    if status.default_enabled { "on" } else { "off" },
                    i18n.get(&description_key).unwrap_or_default()
                );
            }
        }
        Command::Search { term } => {
            print_packages(&aggregate.search(&Command::search_query(&term)).await);
        }
        Command::Installed => print_packages(&aggregate.list_installed().await),
        Command::Updates => print_packages(&aggregate.list_updates().await),
        Command::Run => serve(&host, &registry, &aggregate).await?,
        Command::SyncWorker { .. } => {}
    }
    Ok(())
}

fn print_packages(result: &FanOut<Package>) {
    for package in &result.items {
        let version = match (&package.version, &package.latest_version) {
            (Some(current), Some(latest)) if current != latest => format!("{current} -> {latest}"),
            (Some(version), _) | (None, Some(version)) => version.clone(),
            (None, None) => "-".to_string(),
        };
        println!("{:<10} {:<40} {version}", package.origin, package.id);
    }
    for failure in &result.failures {
        eprintln!("{} failed: {}", failure.gem, failure.error);
    }
}

async fn serve(
    host: &Host,
    registry: &PluginRegistry,
    aggregate: &AggregateManager,
) -> Result<(), StartupError> {
    let prepared = aggregate.prepare().await;
    info!("Prepared gems: {}", prepared.items.join(", "));

    let sweeper = host.start_cache_sweeper()?;
    let isolation = SyncToggles::from_env().isolation();
    let mut tasks = host.start_database_sync(registry, isolation);
    info!(
        "pakhub running with {} database updaters ({isolation:?})",
        tasks.len()
    );

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {error}");
    }

    info!("Shutting down");
    sweeper.stop();
    tokio::task::spawn_blocking(move || {
        for task in &mut tasks {
            task.shutdown();
        }
    })
    .await
    .unwrap_or_else(|error| warn!("Background task shutdown failed: {error}"));
    Ok(())
}

async fn sync_worker(
    host: &Host,
    registry: &PluginRegistry,
    gem: &str,
) -> Result<(), StartupError> {
    let source = host.database_source(registry, gem)?;
    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    run_synchronizer(
        source,
        host.settings.download_timeout(),
        host.settings.db_sync_interval(),
        SyncToggles::updater_enabled(gem),
        cancel,
    )
    .await
}
