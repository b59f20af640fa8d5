mod backend;
mod output;
mod provider;

pub use backend::FlatpakBackend;
pub use output::{parse_installed, parse_search_results, parse_updates};
pub use provider::FlatpakProvider;
