//! Workspace cleaning.
//!
//! Each function empties one part of the workspace and leaves the directory
//! itself in place, so `WorkspacePaths` stays valid afterwards.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::workspace::WorkspacePaths;

/// Remove every assembled rootfs.
pub fn clean_rootfs(paths: &WorkspacePaths) -> Result<()> {
    paths.clean_rootfs()?;
    println!("Rootfs cleaned.");
    Ok(())
}

/// Remove downloaded source tarballs.
pub fn clean_downloads(paths: &WorkspacePaths) -> Result<()> {
    if empty_dir(&paths.download())? {
        println!("Downloads cleaned.");
    } else {
        println!("No downloads to clean.");
    }
    Ok(())
}

/// Remove cached package archives and extracted build trees.
pub fn clean_cache(paths: &WorkspacePaths) -> Result<()> {
    let mut cleaned = empty_dir(&paths.cache())?;
    fs::create_dir_all(paths.pacman_cache())
        .with_context(|| format!("Failed to recreate {}", paths.pacman_cache().display()))?;
    cleaned |= empty_dir(&paths.build())?;

    if cleaned {
        println!("Package cache and build trees cleaned.");
    } else {
        println!("No cache to clean.");
    }
    Ok(())
}

/// Clean everything except logs.
pub fn clean_all(paths: &WorkspacePaths) -> Result<()> {
    clean_rootfs(paths)?;
    clean_downloads(paths)?;
    clean_cache(paths)?;
    empty_dir(&paths.tmp())?;
    println!("\nFull clean complete.");
    Ok(())
}

/// Delete the contents of `dir`. Returns whether anything was removed.
fn empty_dir(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut removed = false;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        println!("Removing {}...", path.display());
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Failed to remove {}", path.display()))?;
        removed = true;
    }
    Ok(removed)
}
