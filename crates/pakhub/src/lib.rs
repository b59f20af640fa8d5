//! Host side of pakhub: gem discovery, the aggregate manager, settings,
//! logging and the wiring that starts background work.

pub mod aggregate;
pub mod cli;
pub mod gem_slots;
pub mod logging;
pub mod registry;
pub mod settings;
pub mod startup;

pub use aggregate::{AggregateError, AggregateManager, BackendFailure, FanOut};
pub use registry::{Discovery, DiscoveryError, PluginRegistry};
pub use settings::{Settings, SettingsError};
pub use startup::{Host, StartupError};
