use std::path::Path;

use log::{debug, warn};
use pakhub_backend::BackendError;
use pakhub_core::sync::list_database_files;
use pakhub_core::sync::lock::read_locked;

/// One line of an application database: `name<TAB>version<TAB>description`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl AppRecord {
    fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(query)
            || self
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(query))
    }
}

#[must_use]
pub fn parse_app_records(content: &str) -> Vec<AppRecord> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            let version = fields.next()?.trim();
            if name.is_empty() || version.is_empty() {
                return None;
            }
            let description = fields
                .next()
                .map(str::trim)
                .filter(|description| !description.is_empty())
                .map(str::to_string);
            Some(AppRecord {
                name: name.to_string(),
                version: version.to_string(),
                description,
            })
        })
        .collect()
}

/// `name<TAB>version` lines of the installed-apps registry.
#[must_use]
pub fn parse_installed_records(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| {
            let (name, version) = line.trim().split_once('\t')?;
            let (name, version) = (name.trim(), version.trim());
            (!name.is_empty() && !version.is_empty())
                .then(|| (name.to_string(), version.to_string()))
        })
        .collect()
}

/// Every record of every `*.db` file in `db_dir`, each file read under its
/// lock. Files vanishing mid-swap are skipped.
pub(crate) fn load_records(db_dir: &Path) -> Result<Vec<AppRecord>, BackendError> {
    let files = list_database_files(db_dir)
        .map_err(|error| BackendError::database("list databases", error))?;
    if files.is_empty() {
        warn!("No AppImage database found in {}", db_dir.display());
    }

    let mut records = Vec::new();
    for file in &files {
        match read_locked(file) {
            Ok(Some(bytes)) => {
                let parsed = parse_app_records(&String::from_utf8_lossy(&bytes));
                debug!("Read {} records from {}", parsed.len(), file.display());
                records.extend(parsed);
            }
            Ok(None) => debug!("{} disappeared before it could be read", file.display()),
            Err(error) => return Err(BackendError::database("read database", error)),
        }
    }
    Ok(records)
}

pub(crate) fn search_records(records: Vec<AppRecord>, query: &str) -> Vec<AppRecord> {
    let query = query.trim().to_lowercase();
    records
        .into_iter()
        .filter(|record| record.matches(&query))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        AppRecord, load_records, parse_app_records, parse_installed_records, search_records,
    };

    #[test]
    fn parse_app_records_skips_comments_and_short_lines() {
        let content = "# generated\nkrita\t5.2.0\tDigital painting\n\nbroken-line\nfreecad\t0.21\t\n";

        let records = parse_app_records(content);

        assert_eq!(
            records,
            vec![
                AppRecord {
                    name: "krita".to_string(),
                    version: "5.2.0".to_string(),
                    description: Some("Digital painting".to_string()),
                },
                AppRecord {
                    name: "freecad".to_string(),
                    version: "0.21".to_string(),
                    description: None,
                },
            ]
        );
    }

    #[test]
    fn parse_installed_records_requires_both_fields() {
        let records = parse_installed_records("krita\t5.1.0\nonly-name\n\t1.0\n");

        assert_eq!(records, vec![("krita".to_string(), "5.1.0".to_string())]);
    }

    #[test]
    fn search_matches_name_and_description_case_insensitively() {
        let records = parse_app_records(
            "Krita\t5.2.0\tDigital painting\nfreecad\t0.21\tParametric 3D modeler\nvlc\t3.0\tMedia player\n",
        );

        let names: Vec<String> = search_records(records.clone(), "KRI")
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["Krita"]);

        let names: Vec<String> = search_records(records, " 3d ")
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["freecad"]);
    }

    #[test]
    fn load_records_reads_every_database_in_name_order() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(temp.path().join("b.db"), "vlc\t3.0\tMedia player\n").expect("b.db");
        std::fs::write(temp.path().join("a.db"), "krita\t5.2.0\n").expect("a.db");
        std::fs::write(temp.path().join("readme.txt"), "ignored\t1\n").expect("readme");

        let records = load_records(temp.path()).expect("records load");

        let names: Vec<&str> = records.iter().map(|record| record.name.as_str()).collect();
        assert_eq!(names, vec!["krita", "vlc"]);
    }

    #[test]
    fn load_records_tolerates_missing_directory() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let records = load_records(&temp.path().join("missing")).expect("records load");

        assert!(records.is_empty());
    }
}
