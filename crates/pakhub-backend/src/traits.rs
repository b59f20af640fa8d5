use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pakhub_core::{DatabaseSource, SharedContext};
use pakhub_platform::AppPaths;

use crate::error::BackendError;
use crate::types::Package;

/// Static description of one gem and the factory for its manager.
pub trait GemProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;

    /// Directory holding `<locale>` translation files for this gem.
    fn locale_dir(&self, paths: &AppPaths) -> PathBuf {
        paths.gem_locale_dir(self.name())
    }

    /// Build the manager. Called once, after the context is frozen.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be initialized.
    fn create_manager(
        &self,
        context: Arc<SharedContext>,
    ) -> Result<Box<dyn SoftwareManager>, BackendError>;

    /// Remote database archive this gem keeps in sync, if any.
    fn database_source(&self, _paths: &AppPaths) -> Option<DatabaseSource> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ManagerCapabilities {
    pub supports_search: bool,
    pub supports_install: bool,
    pub supports_uninstall: bool,
    pub supports_upgrade: bool,
}

/// Operations that change the system and go to exactly one gem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Install,
    Uninstall,
    Upgrade,
}

impl Mutation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Upgrade => "upgrade",
        }
    }
}

impl ManagerCapabilities {
    #[must_use]
    pub fn allows(self, mutation: Mutation) -> bool {
        match mutation {
            Mutation::Install => self.supports_install,
            Mutation::Uninstall => self.supports_uninstall,
            Mutation::Upgrade => self.supports_upgrade,
        }
    }
}

#[async_trait]
pub trait SoftwareManager: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> ManagerCapabilities;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Whether this gem is on when the user never chose a gem set.
    fn is_default_enabled(&self) -> bool;

    fn handles_origin(&self, origin: &str) -> bool {
        origin == self.name()
    }

    /// One-time warm-up after discovery.
    async fn prepare(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<Package>, BackendError>;

    async fn list_installed(&self) -> Result<Vec<Package>, BackendError>;

    async fn list_updates(&self) -> Result<Vec<Package>, BackendError> {
        let installed = self.list_installed().await?;
        Ok(installed.into_iter().filter(Package::has_update).collect())
    }

    async fn install(&self, package: &Package) -> Result<(), BackendError>;

    async fn uninstall(&self, package: &Package) -> Result<(), BackendError>;

    async fn upgrade(&self, _package: &Package) -> Result<(), BackendError> {
        Err(BackendError::unsupported("upgrade"))
    }
}
