mod distro;
mod paths;

pub use distro::{DistroId, detect_distro, parse_os_release_id};
pub use paths::{AppPaths, AppPathsError};
