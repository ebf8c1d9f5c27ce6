//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Assemble the rootfs (all stages or one)
//! - `clean` - Empty parts of the workspace
//! - `show` - Display configuration and paths
//! - `preflight` - Run preflight checks

pub mod build;
pub mod clean;
mod preflight;
pub mod show;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
