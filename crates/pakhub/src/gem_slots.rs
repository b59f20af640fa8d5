use std::sync::Arc;

use pakhub_backend::GemProvider;

/// A named place for a gem. The slot is present when its backend crate was
/// compiled in through the matching cargo feature.
#[derive(Clone)]
pub struct GemSlot {
    name: &'static str,
    provider: Option<Arc<dyn GemProvider>>,
}

impl GemSlot {
    #[must_use]
    pub fn present(provider: Arc<dyn GemProvider>) -> Self {
        Self {
            name: provider.name(),
            provider: Some(provider),
        }
    }

    #[must_use]
    pub const fn absent(name: &'static str) -> Self {
        Self {
            name,
            provider: None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn provider(&self) -> Option<&Arc<dyn GemProvider>> {
        self.provider.as_ref()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.provider.is_some()
    }
}

impl std::fmt::Debug for GemSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GemSlot")
            .field("name", &self.name)
            .field("present", &self.is_present())
            .finish()
    }
}

#[cfg(feature = "appimage")]
fn appimage_slot() -> GemSlot {
    GemSlot::present(Arc::new(pakhub_appimage::AppImageProvider::new()))
}

#[cfg(not(feature = "appimage"))]
fn appimage_slot() -> GemSlot {
    GemSlot::absent("appimage")
}

#[cfg(feature = "flatpak")]
fn flatpak_slot() -> GemSlot {
    GemSlot::present(Arc::new(pakhub_flatpak::FlatpakProvider::new()))
}

#[cfg(not(feature = "flatpak"))]
fn flatpak_slot() -> GemSlot {
    GemSlot::absent("flatpak")
}

/// Every gem pakhub knows about, in table order. No snap backend ships yet,
/// so that slot is always empty.
#[must_use]
pub fn builtin_slots() -> Vec<GemSlot> {
    vec![flatpak_slot(), appimage_slot(), GemSlot::absent("snap")]
}
