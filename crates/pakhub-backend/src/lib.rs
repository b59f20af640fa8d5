mod error;
mod traits;
mod types;

pub use error::BackendError;
pub use traits::{GemProvider, ManagerCapabilities, Mutation, SoftwareManager};
pub use types::{GemStatus, Package};
