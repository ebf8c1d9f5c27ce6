//! Recursive copy that never opens device nodes, sockets or fifos.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;
use walkdir::WalkDir;

/// What a [`safe_copy_tree`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
}

/// True for sockets, character/block devices and named pipes.
pub fn is_special_file(file_type: &fs::FileType) -> bool {
    file_type.is_socket()
        || file_type.is_char_device()
        || file_type.is_block_device()
        || file_type.is_fifo()
}

/// Copy `src` into `dst`, keeping relative layout and permission bits.
///
/// Types are taken from `lstat`. Special files are skipped unopened. A
/// symlink is copied as a file when it resolves to a regular file and
/// skipped otherwise.
pub fn safe_copy_tree(src: &Path, dst: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    // Directories come after their contents so read-only modes are applied last.
    for entry in WalkDir::new(src).min_depth(1).contents_first(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", path.display(), src.display()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let mode = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .permissions()
                .mode();
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to chmod {}", target.display()))?;
            stats.dirs += 1;
        } else if file_type.is_file() {
            copy_file(path, &target)?;
            stats.files += 1;
        } else if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {
                    copy_file(path, &target)?;
                    stats.files += 1;
                }
                _ => {
                    tracing::debug!("Skipping symlink {}", path.display());
                    stats.skipped += 1;
                }
            }
        } else {
            debug_assert!(is_special_file(&file_type));
            tracing::debug!("Skipping special file {}", path.display());
            stats.skipped += 1;
        }
    }

    Ok(stats)
}

/// Copy one regular file, creating parent directories. `fs::copy` keeps the mode.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if dst.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(dst).with_context(|| format!("Failed to remove {}", dst.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}
