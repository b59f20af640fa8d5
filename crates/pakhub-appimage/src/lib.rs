mod backend;
mod database;
mod provider;

pub use backend::AppImageBackend;
pub use database::{AppRecord, parse_app_records, parse_installed_records};
pub use provider::{AppImageProvider, DATABASE_URL, DATABASE_URL_ENV};
