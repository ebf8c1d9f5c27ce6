//! Clean command - empties parts of the workspace.

use anyhow::Result;

use crate::clean;
use crate::workspace::WorkspacePaths;

/// Clean target for the clean command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget {
    /// Assembled rootfs trees (default)
    Rootfs,
    /// Downloaded source tarballs
    Downloads,
    /// Package cache and extracted sources
    Cache,
    /// Everything but logs
    All,
}

/// Execute the clean command.
pub fn cmd_clean(paths: &WorkspacePaths, target: CleanTarget) -> Result<()> {
    match target {
        CleanTarget::Rootfs => clean::clean_rootfs(paths),
        CleanTarget::Downloads => clean::clean_downloads(paths),
        CleanTarget::Cache => clean::clean_cache(paths),
        CleanTarget::All => clean::clean_all(paths),
    }
}
