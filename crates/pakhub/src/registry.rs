//! Gem discovery.
//!
//! [`PluginRegistry::discover`] runs in two phases. First every present slot
//! contributes its locale file to a [`TranslationTableBuilder`]; the table is
//! then frozen into the [`SharedContext`]. Only afterwards are the managers
//! instantiated and their enablement decided, so no backend ever observes a
//! half-built translation table.

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use pakhub_backend::{BackendError, GemProvider, SoftwareManager};
use pakhub_core::{ContextBuilder, LocaleError, SharedContext, TranslationTableBuilder};

use crate::gem_slots::{GemSlot, builtin_slots};
use crate::settings::Settings;

/// A per-slot fault. Discovery logs it, skips the affected step and moves on.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to load locale of gem '{gem}': {source}")]
    Locale {
        gem: &'static str,
        #[source]
        source: LocaleError,
    },
    #[error("failed to instantiate gem '{gem}': {source}")]
    Instantiate {
        gem: &'static str,
        #[source]
        source: BackendError,
    },
}

impl DiscoveryError {
    #[must_use]
    pub fn gem(&self) -> &'static str {
        match self {
            Self::Locale { gem, .. } | Self::Instantiate { gem, .. } => gem,
        }
    }
}

pub struct Discovery {
    pub context: Arc<SharedContext>,
    /// Every instantiated manager, enabled or not, in slot-name order.
    pub managers: Vec<Arc<dyn SoftwareManager>>,
    pub errors: Vec<DiscoveryError>,
}

impl Discovery {
    #[must_use]
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.managers
            .iter()
            .filter(|manager| manager.is_enabled())
            .map(|manager| manager.name())
            .collect()
    }
}

pub struct PluginRegistry {
    slots: Vec<GemSlot>,
}

impl PluginRegistry {
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_slots(builtin_slots())
    }

    /// Slots are kept in lexicographic name order whatever order they are
    /// given in.
    #[must_use]
    pub fn with_slots(mut slots: Vec<GemSlot>) -> Self {
        slots.sort_by(|a, b| a.name().cmp(b.name()));
        Self { slots }
    }

    #[must_use]
    pub fn slots(&self) -> &[GemSlot] {
        &self.slots
    }

    /// Providers of the present slots, in name order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn GemProvider>> {
        self.slots.iter().filter_map(GemSlot::provider)
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&Arc<dyn GemProvider>> {
        self.providers().find(|provider| provider.name() == name)
    }

    pub fn discover(
        &self,
        context_builder: ContextBuilder,
        locale: Option<&str>,
        settings: &Settings,
    ) -> Discovery {
        let mut errors = Vec::new();

        for slot in &self.slots {
            if !slot.is_present() {
                debug!("Gem slot '{}' is not compiled in, skipping", slot.name());
            }
        }

        let mut translations = TranslationTableBuilder::new(locale.map(str::to_string));
        for provider in self.providers() {
            let dir = provider.locale_dir(context_builder.paths());
            match translations.merge_locale_dir(&dir) {
                Ok(0) => debug!("No translations merged for gem '{}'", provider.name()),
                Ok(merged) => debug!("Merged {merged} translations of gem '{}'", provider.name()),
                Err(source) => {
                    let error = DiscoveryError::Locale {
                        gem: provider.name(),
                        source,
                    };
                    warn!("{error}");
                    errors.push(error);
                }
            }
        }

        let context = context_builder.build(translations.build());

        let mut managers: Vec<Arc<dyn SoftwareManager>> = Vec::new();
        for provider in self.providers() {
            let mut manager = match provider.create_manager(Arc::clone(&context)) {
                Ok(manager) => manager,
                Err(source) => {
                    let error = DiscoveryError::Instantiate {
                        gem: provider.name(),
                        source,
                    };
                    warn!("{error}");
                    errors.push(error);
                    continue;
                }
            };

            let enabled = settings
                .gem_enabled(provider.name())
                .unwrap_or_else(|| manager.is_default_enabled());
            manager.set_enabled(enabled);
            info!(
                "Gem '{}' loaded ({})",
                provider.name(),
                if enabled { "enabled" } else { "disabled" }
            );
            managers.push(Arc::from(manager));
        }

        Discovery {
            context,
            managers,
            errors,
        }
    }
}
