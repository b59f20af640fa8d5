use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pakhub",
    about = "Search and manage packages from several package formats",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List gems and whether they are enabled
    Gems,

    /// Search every enabled gem
    Search {
        /// Words to search for
        #[arg(required = true, num_args = 1..)]
        term: Vec<String>,
    },

    /// List installed packages
    Installed,

    /// List packages with available updates
    Updates,

    /// Keep caches and databases fresh until Ctrl-C
    Run,

    /// Synchronize one gem's database in the foreground
    #[command(name = "sync-worker", hide = true)]
    SyncWorker {
        /// Gem whose database is synchronized
        gem: String,
    },
}

impl Command {
    /// Search words joined back into one query.
    #[must_use]
    pub fn search_query(term: &[String]) -> String {
        term.join(" ")
    }
}
