use pakhub_backend::Package;

use crate::backend::NAME;

const NO_MATCHES: &str = "No matches found";

fn columns(line: &str) -> Vec<&str> {
    line.split('\t').map(str::trim).collect()
}

fn non_empty(value: Option<&&str>) -> Option<String> {
    value
        .copied()
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// `flatpak search --columns=application,name,version,description`.
#[must_use]
pub fn parse_search_results(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && line.trim() != NO_MATCHES)
        .filter_map(|line| {
            let fields = columns(line);
            let id = non_empty(fields.first())?;
            let mut package = Package::new(NAME, id);
            if let Some(name) = non_empty(fields.get(1)) {
                package = package.with_name(name);
            }
            if let Some(version) = non_empty(fields.get(2)) {
                package = package.with_latest_version(version);
            }
            if let Some(description) = non_empty(fields.get(3)) {
                package = package.with_description(description);
            }
            Some(package)
        })
        .collect()
}

/// `flatpak list --app --columns=application,name,version`.
#[must_use]
pub fn parse_installed(output: &str) -> Vec<Package> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = columns(line);
            let id = non_empty(fields.first())?;
            let mut package = Package::new(NAME, id).installed(true);
            if let Some(name) = non_empty(fields.get(1)) {
                package = package.with_name(name);
            }
            if let Some(version) = non_empty(fields.get(2)) {
                package = package.with_version(version);
            }
            Some(package)
        })
        .collect()
}

/// `flatpak remote-ls --updates --app --columns=application,version`,
/// joined with the installed list so each entry carries both versions.
#[must_use]
pub fn parse_updates(output: &str, installed: &[Package]) -> Vec<Package> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = columns(line);
            let id = non_empty(fields.first())?;
            let latest = non_empty(fields.get(1));
            let mut package = installed
                .iter()
                .find(|package| package.id == id)
                .cloned()
                .unwrap_or_else(|| Package::new(NAME, id).installed(true));
            package.latest_version = latest;
            Some(package)
        })
        .collect()
}
