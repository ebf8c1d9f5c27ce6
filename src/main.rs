//! rootfs-builder - assembles a minimal Linux rootfs.
//!
//! Stages, in order:
//! - FHS skeleton (directories, seed files, symlinks) from a YAML/JSON layout
//! - BusyBox, cross-compiled and installed into the skeleton
//! - Packages downloaded with the host's pacman and unpacked with bsdtar

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rootfs_builder::arch::Arch;
use rootfs_builder::commands;
use rootfs_builder::commands::build::{BuildOverrides, BuildTarget as BuildCommandTarget};
use rootfs_builder::config::{split_list, Config};
use rootfs_builder::logging;
use rootfs_builder::pipeline::Stage;
use rootfs_builder::workspace::WorkspacePaths;

#[derive(Parser)]
#[command(name = "rootfs-builder")]
#[command(about = "Minimal Linux rootfs builder")]
#[command(
    after_help = "QUICK START:\n  rootfs-builder preflight  Check host tools and inputs\n  rootfs-builder build      Build the rootfs\n  rootfs-builder show paths Where everything lives\n  rootfs-builder clean      Remove the assembled rootfs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the rootfs (all stages unless one is named)
    Build {
        #[command(subcommand)]
        target: Option<BuildTarget>,

        /// Target architecture (x86_64, x86_64-efi, arm64)
        #[arg(long, global = true)]
        arch: Option<Arch>,

        /// Empty this architecture's rootfs first
        #[arg(long, global = true)]
        clean: bool,

        /// FHS layout file (overrides ROOTFS_FHS_LAYOUT)
        #[arg(long, global = true)]
        fhs: Option<PathBuf>,

        /// BusyBox build config (overrides ROOTFS_TOOLBOX_CONFIG)
        #[arg(long, global = true)]
        toolbox: Option<PathBuf>,

        /// Comma-separated package list (overrides ROOTFS_PACKAGES)
        #[arg(long, global = true)]
        packages: Option<String>,
    },

    /// Clean workspace content (default: rootfs)
    Clean {
        #[command(subcommand)]
        what: Option<CleanTarget>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Run preflight checks (verify host tools and inputs before a build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum BuildTarget {
    /// Create the FHS skeleton only
    Fhs,
    /// Build and install BusyBox only
    Toolbox,
    /// Download and extract packages only
    Packages,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show workspace paths
    Paths,
}

#[derive(Subcommand)]
enum CleanTarget {
    /// Remove assembled rootfs trees
    Rootfs,
    /// Remove downloaded source tarballs
    Downloads,
    /// Remove cached packages and extracted sources
    Cache,
    /// Remove everything except logs
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = std::env::current_dir().context("Failed to determine current directory")?;

    let config = Config::load(&base_dir)?;
    // Logging first, so workspace creation is recorded.
    logging::init(&WorkspacePaths::logs_under(&config.workspace))?;
    let paths = WorkspacePaths::new(&config.workspace)?;

    match cli.command {
        Commands::Build {
            target,
            arch,
            clean,
            fhs,
            toolbox,
            packages,
        } => {
            let build_target = match target {
                None => BuildCommandTarget::Full,
                Some(BuildTarget::Fhs) => BuildCommandTarget::Stage(Stage::Fhs),
                Some(BuildTarget::Toolbox) => BuildCommandTarget::Stage(Stage::Toolbox),
                Some(BuildTarget::Packages) => BuildCommandTarget::Stage(Stage::Packages),
            };
            let overrides = BuildOverrides {
                arch,
                clean,
                fhs_layout: fhs,
                toolbox_config: toolbox,
                packages: packages.as_deref().map(split_list),
            };
            commands::cmd_build(&paths, build_target, &config, &overrides)?;
        }

        Commands::Clean { what } => {
            let clean_target = match what {
                None | Some(CleanTarget::Rootfs) => commands::clean::CleanTarget::Rootfs,
                Some(CleanTarget::Downloads) => commands::clean::CleanTarget::Downloads,
                Some(CleanTarget::Cache) => commands::clean::CleanTarget::Cache,
                Some(CleanTarget::All) => commands::clean::CleanTarget::All,
            };
            commands::cmd_clean(&paths, clean_target)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Paths => commands::show::ShowTarget::Paths,
            };
            commands::cmd_show(&paths, show_target, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }
    }

    Ok(())
}
