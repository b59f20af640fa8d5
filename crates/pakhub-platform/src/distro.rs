use std::fmt;
use std::path::Path;

use log::debug;

const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// The `ID` field of `os-release`, lowercased. Backends use it to pick
/// distro-specific behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistroId(String);

impl DistroId {
    pub const UNKNOWN: &'static str = "unknown";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_ascii_lowercase())
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for DistroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[must_use]
pub fn detect_distro() -> DistroId {
    for path in OS_RELEASE_PATHS {
        if let Some(id) = read_os_release_id(Path::new(path)) {
            debug!("Detected distro '{id}' from {path}");
            return id;
        }
    }
    DistroId::unknown()
}

fn read_os_release_id(path: &Path) -> Option<DistroId> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_os_release_id(&content)
}

#[must_use]
pub fn parse_os_release_id(content: &str) -> Option<DistroId> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim().trim_matches('"').trim_matches('\'');
        (!value.is_empty()).then(|| DistroId::new(value))
    })
}
