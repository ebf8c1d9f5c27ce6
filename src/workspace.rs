//! Working directory layout shared by every build stage.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::arch::Arch;
use crate::logging::BUILD_LOG_NAME;

/// The workspace tree under one root.
///
/// ```text
/// <root>/work/
///   download/        source tarballs
///   cache/pacman/    package archives, per arch
///   build/           extracted sources, per arch
///   rootfs/          the assembled trees, per arch
///   images/
///   logs/build.log
///   tmp/
/// ```
///
/// Every directory exists once [`WorkspacePaths::new`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    /// Create (if needed) and canonicalize the workspace under `root`.
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create workspace root {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace root {}", root.display()))?;

        let paths = Self { root };
        paths.ensure()?;
        Ok(paths)
    }

    fn ensure(&self) -> Result<()> {
        for dir in self.managed_dirs() {
            if !dir.is_dir() {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                tracing::info!("[workspace] created: {}", dir.display());
            }
        }
        Ok(())
    }

    fn managed_dirs(&self) -> [PathBuf; 9] {
        [
            self.work(),
            self.download(),
            self.cache(),
            self.pacman_cache(),
            self.build(),
            self.rootfs(),
            self.images(),
            self.logs(),
            self.tmp(),
        ]
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn download(&self) -> PathBuf {
        self.work().join("download")
    }

    pub fn cache(&self) -> PathBuf {
        self.work().join("cache")
    }

    pub fn pacman_cache(&self) -> PathBuf {
        self.cache().join("pacman")
    }

    pub fn build(&self) -> PathBuf {
        self.work().join("build")
    }

    pub fn rootfs(&self) -> PathBuf {
        self.work().join("rootfs")
    }

    pub fn images(&self) -> PathBuf {
        self.work().join("images")
    }

    pub fn logs(&self) -> PathBuf {
        Self::logs_under(&self.root)
    }

    /// Logs directory for a workspace `root`, usable before the workspace exists.
    pub fn logs_under(root: &Path) -> PathBuf {
        root.join("work").join("logs")
    }

    pub fn tmp(&self) -> PathBuf {
        self.work().join("tmp")
    }

    pub fn build_log(&self) -> PathBuf {
        self.logs().join(BUILD_LOG_NAME)
    }

    pub fn arch_rootfs(&self, arch: Arch) -> PathBuf {
        self.rootfs().join(arch.rootfs_subdir())
    }

    pub fn arch_build_dir(&self, arch: Arch) -> PathBuf {
        self.build().join(arch.rootfs_subdir())
    }

    pub fn arch_pacman_cache(&self, arch: Arch) -> PathBuf {
        self.pacman_cache().join(arch.rootfs_subdir())
    }

    /// Remove everything under `rootfs/` and recreate it empty.
    pub fn clean_rootfs(&self) -> Result<()> {
        let rootfs = self.rootfs();
        if rootfs.exists() {
            tracing::info!("Removing {}...", rootfs.display());
            fs::remove_dir_all(&rootfs)
                .with_context(|| format!("Failed to remove {}", rootfs.display()))?;
        }
        fs::create_dir_all(&rootfs)
            .with_context(|| format!("Failed to recreate {}", rootfs.display()))?;
        Ok(())
    }

    /// Remove the tree for one architecture only.
    pub fn clean_arch_rootfs(&self, arch: Arch) -> Result<()> {
        let rootfs = self.arch_rootfs(arch);
        if rootfs.exists() {
            tracing::info!("Removing {}...", rootfs.display());
            fs::remove_dir_all(&rootfs)
                .with_context(|| format!("Failed to remove {}", rootfs.display()))?;
        }
        Ok(())
    }
}
