use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, trace};
use tokio::process::Command;

use pakhub_backend::{BackendError, ManagerCapabilities, Package, SoftwareManager};

use crate::output::{parse_installed, parse_search_results, parse_updates};

pub(crate) const NAME: &str = "flatpak";
const DEFAULT_REMOTE: &str = "flathub";
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct FlatpakBackend {
    path: PathBuf,
    available: bool,
    enabled: bool,
    query_timeout: Duration,
}

impl FlatpakBackend {
    #[must_use]
    pub fn new(path: PathBuf, available: bool) -> Self {
        Self {
            path,
            available,
            enabled: false,
            query_timeout: QUERY_TIMEOUT,
        }
    }

    fn build_command(&self, args: &[&str]) -> Command {
        debug!(
            "Building flatpak command: {} {}",
            self.path.display(),
            args.join(" ")
        );
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn execute(&self, args: &[&str]) -> Result<String, BackendError> {
        info!("Executing flatpak command: {}", args.join(" "));

        let output = self.build_command(args).output().await?;

        debug!("flatpak command exit status: {:?}", output.status);
        trace!("flatpak stdout: {}", String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            trace!("flatpak stderr: {}", String::from_utf8_lossy(&output.stderr));
        }

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            debug!("flatpak command succeeded, output: {} bytes", stdout.len());
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!("flatpak command failed: args={args:?}, stderr='{stderr}'");
            Err(BackendError::CommandFailed { stderr })
        }
    }

    /// Read-only queries are bounded; installs run as long as they need.
    async fn query(&self, args: &[&str]) -> Result<String, BackendError> {
        match tokio::time::timeout(self.query_timeout, self.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                after: self.query_timeout,
            }),
        }
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        if self.available {
            Ok(())
        } else {
            Err(BackendError::NotAvailable { name: NAME })
        }
    }
}

#[async_trait]
impl SoftwareManager for FlatpakBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> ManagerCapabilities {
        ManagerCapabilities {
            supports_search: true,
            supports_install: true,
            supports_uninstall: true,
            supports_upgrade: true,
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_default_enabled(&self) -> bool {
        self.available
    }

    async fn prepare(&self) -> Result<(), BackendError> {
        self.ensure_available()?;
        let version = self.query(&["--version"]).await?;
        info!("Using {}", version.trim());
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<Package>, BackendError> {
        self.ensure_available()?;
        let output = self
            .query(&[
                "search",
                "--columns=application,name,version,description",
                query,
            ])
            .await?;
        Ok(parse_search_results(&output))
    }

    async fn list_installed(&self) -> Result<Vec<Package>, BackendError> {
        self.ensure_available()?;
        let output = self
            .query(&["list", "--app", "--columns=application,name,version"])
            .await?;
        Ok(parse_installed(&output))
    }

    async fn list_updates(&self) -> Result<Vec<Package>, BackendError> {
        let installed = self.list_installed().await?;
        let output = self
            .query(&[
                "remote-ls",
                "--updates",
                "--app",
                "--columns=application,version",
            ])
            .await?;
        Ok(parse_updates(&output, &installed))
    }

    async fn install(&self, package: &Package) -> Result<(), BackendError> {
        self.ensure_available()?;
        self.execute(&["install", "-y", "--noninteractive", DEFAULT_REMOTE, &package.id])
            .await?;
        Ok(())
    }

    async fn uninstall(&self, package: &Package) -> Result<(), BackendError> {
        self.ensure_available()?;
        self.execute(&["uninstall", "-y", "--noninteractive", &package.id])
            .await?;
        Ok(())
    }

    async fn upgrade(&self, package: &Package) -> Result<(), BackendError> {
        self.ensure_available()?;
        self.execute(&["update", "-y", "--noninteractive", &package.id])
            .await?;
        Ok(())
    }
}
