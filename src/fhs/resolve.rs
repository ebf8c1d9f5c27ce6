//! Path resolution inside a rootfs.
//!
//! Symlinks already present in the tree are followed the way they would be
//! after a chroot into it: absolute targets restart at the rootfs root and
//! `..` never climbs above it. Nothing resolved here can name a host path
//! outside the rootfs.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Same limit the kernel applies to nested symlink lookups.
const MAX_SYMLINK_HOPS: usize = 40;

enum Step {
    Up,
    Name(OsString),
}

fn steps(path: &Path) -> Vec<Step> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(Step::Name(name.to_os_string())),
            Component::ParentDir => Some(Step::Up),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

/// Resolve `relative` (a path inside the rootfs) to a host path under `rootfs`.
///
/// Every existing component of the result is a real directory or file, so
/// creating or writing at the returned path cannot leave the rootfs.
pub fn resolve_in_rootfs(rootfs: &Path, relative: &Path) -> Result<PathBuf> {
    let mut resolved: Vec<OsString> = Vec::new();
    // Consumed from the back.
    let mut pending: Vec<Step> = steps(relative).into_iter().rev().collect();
    let mut hops = 0;

    while let Some(step) = pending.pop() {
        let name = match step {
            Step::Up => {
                resolved.pop();
                continue;
            }
            Step::Name(name) => name,
        };

        let candidate = join(rootfs, &resolved).join(&name);
        let is_link = candidate
            .symlink_metadata()
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            resolved.push(name);
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            bail!(
                "too many levels of symlinks resolving {} in {}",
                relative.display(),
                rootfs.display()
            );
        }
        let target = fs::read_link(&candidate)
            .with_context(|| format!("Failed to read symlink {}", candidate.display()))?;
        if target.is_absolute() {
            resolved.clear();
        }
        pending.extend(steps(&target).into_iter().rev());
    }

    Ok(join(rootfs, &resolved))
}

/// Resolve everything but the last component, which is kept as is.
///
/// Used where the entry itself is about to be replaced (symlink creation).
pub fn resolve_parent_in_rootfs(rootfs: &Path, relative: &Path) -> Result<PathBuf> {
    let Some(name) = relative.file_name() else {
        bail!("{} has no final component", relative.display());
    };
    let parent = relative.parent().unwrap_or(Path::new(""));
    Ok(resolve_in_rootfs(rootfs, parent)?.join(name))
}

/// Lexical path from directory `from` to `to`, both relative to the same root.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut path = PathBuf::new();
    for _ in common..from.len() {
        path.push("..");
    }
    for component in &to[common..] {
        path.push(component.as_os_str());
    }
    path
}

fn join(rootfs: &Path, parts: &[OsString]) -> PathBuf {
    let mut path = rootfs.to_path_buf();
    path.extend(parts);
    path
}
