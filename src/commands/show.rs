//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;
use crate::workspace::WorkspacePaths;

/// Show target for the show command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show workspace paths
    Paths,
}

/// Execute the show command.
pub fn cmd_show(paths: &WorkspacePaths, target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Paths => {
            println!("Workspace: {}", paths.root().display());
            for (label, path) in [
                ("download", paths.download()),
                ("cache", paths.cache()),
                ("build", paths.arch_build_dir(config.arch)),
                ("pacman cache", paths.arch_pacman_cache(config.arch)),
                ("rootfs", paths.arch_rootfs(config.arch)),
                ("images", paths.images()),
                ("tmp", paths.tmp()),
                ("log", paths.build_log()),
            ] {
                println!("  {:<13} {}", label, path.display());
            }
        }
    }
    Ok(())
}
