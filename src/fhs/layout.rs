//! Declarative filesystem-hierarchy layout.
//!
//! ```yaml
//! fhs:
//!   directories: [/bin, /etc, /usr/lib]
//!   files:
//!     - path: /etc/hostname
//!       content: "rootfs\n"
//!     - path: /etc/motd            # created empty, never overwritten
//!   symlinks:
//!     - link: /lib
//!       target: usr/lib
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::BuildError;
use crate::loader;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhsLayout {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub symlinks: Vec<SymlinkEntry>,
    /// Directory of the layout file; relative `source` paths resolve here.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkEntry {
    pub link: String,
    pub target: String,
}

/// What a file entry writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileContent<'a> {
    Inline(&'a str),
    Source(&'a Path),
    /// Create empty if absent, otherwise leave alone.
    Touch,
}

impl FileEntry {
    pub fn kind(&self) -> FileContent<'_> {
        match (&self.content, &self.source) {
            (Some(content), _) => FileContent::Inline(content),
            (None, Some(source)) => FileContent::Source(source),
            (None, None) => FileContent::Touch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayoutDocument {
    fhs: Option<FhsLayout>,
}

impl FhsLayout {
    /// Load a layout from a `.yaml`, `.yml` or `.json` file with a top-level `fhs` key.
    pub fn load(path: &Path) -> Result<Self> {
        let document: LayoutDocument = loader::load(path)?;
        let Some(mut layout) = document.fhs else {
            return Err(BuildError::ConfigSchema {
                path: path.to_path_buf(),
                message: "missing top-level key 'fhs'".to_string(),
            }
            .into());
        };

        layout.base_dir = path.parent().map(Path::to_path_buf);
        layout.normalize();
        if let Err(err) = layout.validate() {
            return Err(BuildError::ConfigSchema {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
            .into());
        }

        tracing::info!(
            "Loaded FHS layout: {} directories, {} files, {} symlinks",
            layout.directories.len(),
            layout.files.len(),
            layout.symlinks.len()
        );
        Ok(layout)
    }

    /// Collapse duplicate directories (first occurrence wins) and warn about
    /// file entries that set both `content` and `source`.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.directories
            .retain(|dir| seen.insert(dir.trim_start_matches('/').trim_end_matches('/').to_string()));

        for entry in &self.files {
            if entry.content.is_some() && entry.source.is_some() {
                tracing::warn!(
                    "{}: both 'content' and 'source' given, using 'content'",
                    entry.path
                );
            }
        }
    }

    /// Check every path stays inside the rootfs.
    pub fn validate(&self) -> Result<()> {
        for dir in &self.directories {
            rootfs_path(dir)?;
        }
        for entry in &self.files {
            rootfs_path(&entry.path)?;
        }
        for link in &self.symlinks {
            rootfs_path(&link.link)?;
            if link.target.is_empty() {
                bail!("symlink '{}' has an empty target", link.link);
            }
        }
        Ok(())
    }

    /// Resolve a `source` path against the layout file's directory.
    pub fn resolve_source(&self, source: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if source.is_relative() => base.join(source),
            _ => source.to_path_buf(),
        }
    }
}

/// Turn a layout path (leading slash optional) into a path relative to the
/// rootfs root. `..` components are rejected.
pub fn rootfs_path(entry: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => bail!("path '{}' escapes the rootfs ('..' not allowed)", entry),
            Component::Prefix(_) => bail!("path '{}' is not a unix path", entry),
        }
    }
    if relative.as_os_str().is_empty() {
        bail!("path '{}' names the rootfs root itself", entry);
    }
    Ok(relative)
}
