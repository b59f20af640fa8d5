use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use which::which;

use pakhub_backend::{BackendError, GemProvider, SoftwareManager};
use pakhub_core::SharedContext;

use crate::backend::{FlatpakBackend, NAME};

#[derive(Default)]
pub struct FlatpakProvider;

impl FlatpakProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn detect_flatpak() -> Option<PathBuf> {
    match which("flatpak") {
        Ok(path) => Some(path),
        Err(error) => {
            debug!("flatpak not found in PATH: {error}");
            None
        }
    }
}

impl GemProvider for FlatpakProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn display_name(&self) -> &'static str {
        "Flatpak"
    }

    fn create_manager(
        &self,
        _context: Arc<SharedContext>,
    ) -> Result<Box<dyn SoftwareManager>, BackendError> {
        let backend = match detect_flatpak() {
            Some(path) => FlatpakBackend::new(path, true),
            None => FlatpakBackend::new(PathBuf::from("flatpak"), false),
        };
        Ok(Box::new(backend))
    }
}
