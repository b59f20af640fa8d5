use serde::{Deserialize, Serialize};

/// A package as reported by one backend. `origin` names the gem that
/// produced it and decides where mutations are routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    pub latest_version: Option<String>,
    pub description: Option<String>,
    pub origin: String,
    pub installed: bool,
}

impl Package {
    #[must_use]
    pub fn new(origin: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: None,
            latest_version: None,
            description: None,
            origin: origin.into(),
            installed: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_latest_version(mut self, version: impl Into<String>) -> Self {
        self.latest_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn installed(mut self, installed: bool) -> Self {
        self.installed = installed;
        self
    }

    /// Installed and a different latest version is known.
    #[must_use]
    pub fn has_update(&self) -> bool {
        match (&self.version, &self.latest_version) {
            (Some(current), Some(latest)) => self.installed && current != latest,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GemStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub default_enabled: bool,
}
