//! Materializes an [`FhsLayout`] under a rootfs root.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::layout::{rootfs_path, FhsLayout, FileContent};
use super::resolve::{resolve_in_rootfs, resolve_parent_in_rootfs};
use crate::error::BuildError;

/// Package database directory, needed by the package stage whatever the layout says.
pub const PACKAGE_DB_DIR: &str = "var/lib/pacman";

pub struct FhsRootBuilder<'a> {
    layout: &'a FhsLayout,
    rootfs: PathBuf,
}

impl<'a> FhsRootBuilder<'a> {
    pub fn new(layout: &'a FhsLayout, rootfs: &Path) -> Self {
        Self {
            layout,
            rootfs: rootfs.to_path_buf(),
        }
    }

    /// Directories, then files, then symlinks. Safe to run repeatedly.
    pub fn build(&self) -> Result<()> {
        tracing::info!("Creating FHS directory structure in {}", self.rootfs.display());
        self.create_directories()?;

        tracing::info!("Creating files...");
        self.create_files()?;

        tracing::info!("Creating symlinks...");
        self.create_symlinks()?;

        tracing::info!("FHS skeleton complete");
        Ok(())
    }

    /// Rootfs-relative layout path to a host path, following in-tree links.
    fn resolve(&self, entry: &str) -> Result<PathBuf> {
        resolve_in_rootfs(&self.rootfs, &rootfs_path(entry)?)
    }

    pub fn create_directories(&self) -> Result<()> {
        for dir in &self.layout.directories {
            let path = self.resolve(dir)?;
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory {}", path.display()))?;
        }

        let db = self.resolve(PACKAGE_DB_DIR)?;
        fs::create_dir_all(&db)
            .with_context(|| format!("Failed to create {}", db.display()))?;
        Ok(())
    }

    pub fn create_files(&self) -> Result<()> {
        for entry in &self.layout.files {
            let target = self.resolve(&entry.path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            match entry.kind() {
                FileContent::Inline(content) => {
                    fs::write(&target, content.as_bytes())
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                }
                FileContent::Source(source) => {
                    let source = self.layout.resolve_source(source);
                    if !source.is_file() {
                        return Err(anyhow::Error::new(BuildError::ConfigNotFound { path: source })
                            .context(format!("source for file entry '{}'", entry.path)));
                    }
                    let bytes = fs::read(&source)
                        .with_context(|| format!("Failed to read {}", source.display()))?;
                    fs::write(&target, bytes)
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                }
                FileContent::Touch => {
                    if target.symlink_metadata().is_err() {
                        fs::File::create(&target)
                            .with_context(|| format!("Failed to create {}", target.display()))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Existing files and links at a link path are replaced. A directory there
    /// has its contents moved under the link target first, so entries the
    /// earlier phases created stay reachable through the new link.
    pub fn create_symlinks(&self) -> Result<()> {
        for entry in &self.layout.symlinks {
            let relative = rootfs_path(&entry.link)?;
            let link = resolve_parent_in_rootfs(&self.rootfs, &relative)?;

            if let Ok(meta) = link.symlink_metadata() {
                if meta.is_dir() {
                    let target = self.link_target_dir(&link, &entry.target)?;
                    tracing::info!(
                        "{} is a directory, moving its contents to {}",
                        link.display(),
                        target.display()
                    );
                    merge_into(&link, &target)?;
                    fs::remove_dir(&link)
                        .with_context(|| format!("Failed to remove directory {}", link.display()))?;
                } else {
                    fs::remove_file(&link)
                        .with_context(|| format!("Failed to remove {}", link.display()))?;
                }
            }

            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::os::unix::fs::symlink(&entry.target, &link).with_context(|| {
                format!(
                    "Failed to create symlink {} -> {}",
                    link.display(),
                    entry.target
                )
            })?;
        }
        Ok(())
    }

    /// Where the link at `link` (a host path under the rootfs) will point,
    /// resolved inside the rootfs. Refuses targets inside the link itself.
    fn link_target_dir(&self, link: &Path, target: &str) -> Result<PathBuf> {
        let parent = link
            .parent()
            .and_then(|p| p.strip_prefix(&self.rootfs).ok())
            .unwrap_or(Path::new(""));
        let target_path = Path::new(target);
        let relative = if target_path.is_absolute() {
            target_path.to_path_buf()
        } else {
            parent.join(target_path)
        };

        let resolved = resolve_in_rootfs(&self.rootfs, &relative)?;
        if resolved.starts_with(link) {
            bail!(
                "cannot replace directory {} with a link into itself ({})",
                link.display(),
                target
            );
        }
        Ok(resolved)
    }
}

/// Move everything in `src` into `dst`, merging directories that exist on
/// both sides. Any other clash is an error and nothing is overwritten.
fn merge_into(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        match to.symlink_metadata() {
            Err(_) => fs::rename(&from, &to).with_context(|| {
                format!("Failed to move {} to {}", from.display(), to.display())
            })?,
            Ok(existing) if existing.is_dir() && entry.file_type()?.is_dir() => {
                merge_into(&from, &to)?;
                fs::remove_dir(&from)
                    .with_context(|| format!("Failed to remove {}", from.display()))?;
            }
            Ok(_) => bail!(
                "{} and {} both exist; the layout puts two entries at the same place",
                from.display(),
                to.display()
            ),
        }
    }
    Ok(())
}
