use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

pub const FALLBACK_LOCALE: &str = "en";

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("no locale file for '{locale}' in {}", dir.display())]
    NotFound { dir: PathBuf, locale: String },
    #[error("failed to read locale file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Frozen key → localized string mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    locale: Option<String>,
    entries: HashMap<String, String>,
}

impl TranslationTable {
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look `key` up, falling back to the key itself so missing translations
    /// stay visible instead of rendering blank.
    #[must_use]
    pub fn tr<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).unwrap_or(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable stage of a [`TranslationTable`]. Later merges overwrite earlier
/// keys, so callers must merge in a deterministic order.
#[derive(Debug, Default)]
pub struct TranslationTableBuilder {
    locale: Option<String>,
    entries: HashMap<String, String>,
}

impl TranslationTableBuilder {
    #[must_use]
    pub fn new(locale: Option<String>) -> Self {
        Self {
            locale,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn merge<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged = 0;
        for (key, value) in entries {
            self.entries.insert(key, value);
            merged += 1;
        }
        merged
    }

    /// Merge the file for this builder's locale from `dir`.
    ///
    /// Returns `Ok(0)` without touching the table when no locale was
    /// requested or `dir` does not exist.
    ///
    /// # Errors
    /// Returns an error if the directory exists but holds no usable locale
    /// file, or the file cannot be read.
    pub fn merge_locale_dir(&mut self, dir: &Path) -> Result<usize, LocaleError> {
        let Some(locale) = self.locale.clone() else {
            return Ok(0);
        };
        if !dir.is_dir() {
            return Ok(0);
        }
        let entries = read_locale_dir(dir, &locale)?;
        let merged = self.merge(entries);
        debug!("Merged {merged} locale keys from {}", dir.display());
        Ok(merged)
    }

    #[must_use]
    pub fn build(self) -> TranslationTable {
        TranslationTable {
            locale: self.locale,
            entries: self.entries,
        }
    }
}

/// Read the best matching locale file from `dir`: the exact locale, then its
/// language part (`pt_BR` → `pt`), then English.
///
/// # Errors
/// Returns [`LocaleError::NotFound`] when none of the candidates exist and
/// [`LocaleError::Io`] when the chosen file cannot be read.
pub fn read_locale_dir(dir: &Path, locale: &str) -> Result<Vec<(String, String)>, LocaleError> {
    let path = locale_candidates(locale)
        .into_iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| LocaleError::NotFound {
            dir: dir.to_path_buf(),
            locale: locale.to_string(),
        })?;

    let content = std::fs::read_to_string(&path).map_err(|source| LocaleError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(parse_locale_file(&content))
}

fn locale_candidates(locale: &str) -> Vec<&str> {
    let mut candidates = vec![locale];
    if let Some((language, _)) = locale.split_once(['_', '-', '.'])
        && !language.is_empty()
    {
        candidates.push(language);
    }
    if !candidates.contains(&FALLBACK_LOCALE) {
        candidates.push(FALLBACK_LOCALE);
    }
    candidates
}

/// Parse `key=value` lines. Blank lines and `#` comments are ignored; the
/// first `=` separates key from value.
#[must_use]
pub fn parse_locale_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}
