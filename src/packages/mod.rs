//! Package stage: fetch packages with the host's pacman, unpack them into the rootfs.
//!
//! pacman only downloads (`-Sw`) into a cache. Installation is a plain
//! `bsdtar` extraction of every cached archive, so no `--root` install and
//! no scriptlets run.

pub mod copy;

pub use copy::{copy_file, is_special_file, safe_copy_tree, CopyStats};

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::fhs::resolve_in_rootfs;
use crate::tools::{PackageExtract, PackageFetch};

/// Installed when nothing else is configured.
pub const DEFAULT_PACKAGES: &[&str] = &[
    "bash",
    "coreutils",
    "util-linux",
    "nano",
    "make",
    "git",
    "wget",
    "curl",
    "pkgconf",
    "autoconf",
    "automake",
];

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".pkg.tar",
    ".pkg.tar.zst",
    ".pkg.tar.xz",
    ".pkg.tar.gz",
    ".pkg.tar.bz2",
];

/// Host locations of the repository configuration copied into the rootfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfigSources {
    pub pacman_conf: PathBuf,
    pub pacman_d: PathBuf,
    /// Keyrings.
    pub pacman_share: PathBuf,
}

impl Default for RepoConfigSources {
    fn default() -> Self {
        Self {
            pacman_conf: PathBuf::from("/etc/pacman.conf"),
            pacman_d: PathBuf::from("/etc/pacman.d"),
            pacman_share: PathBuf::from("/usr/share/pacman"),
        }
    }
}

/// What [`PackageInstaller::install`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub requested: usize,
    pub extracted: usize,
}

pub struct PackageInstaller {
    packages: Vec<String>,
    sources: RepoConfigSources,
    sync_db: bool,
}

impl PackageInstaller {
    /// Duplicate names are dropped, keeping the first occurrence.
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            packages: dedup_packages(packages),
            sources: RepoConfigSources::default(),
            sync_db: false,
        }
    }

    pub fn with_sources(mut self, sources: RepoConfigSources) -> Self {
        self.sources = sources;
        self
    }

    /// Refresh the sync databases (`-Syw`) before downloading.
    pub fn with_sync_db(mut self, sync_db: bool) -> Self {
        self.sync_db = sync_db;
        self
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Copy config, download, extract.
    pub fn install(&self, ctx: &BuildContext) -> Result<InstallSummary> {
        let rootfs = ctx.rootfs();
        self.copy_repository_config(&rootfs)?;
        self.download(ctx)?;
        let extracted = self.extract_all(ctx)?;

        tracing::info!(
            "Installed {} package archive(s) into {}",
            extracted,
            rootfs.display()
        );
        Ok(InstallSummary {
            requested: self.packages.len(),
            extracted,
        })
    }

    /// `pacman.conf` is required, `pacman.d` and the keyrings are copied when present.
    pub fn copy_repository_config(&self, rootfs: &Path) -> Result<()> {
        let conf = &self.sources.pacman_conf;
        if !conf.is_file() {
            return Err(BuildError::ConfigNotFound { path: conf.clone() }.into());
        }
        copy_file(conf, &resolve_in_rootfs(rootfs, Path::new("etc/pacman.conf"))?)?;
        tracing::info!("Copied {} into rootfs", conf.display());

        for (source, dest) in [
            (&self.sources.pacman_d, "etc/pacman.d"),
            (&self.sources.pacman_share, "usr/share/pacman"),
        ] {
            if !source.is_dir() {
                tracing::warn!("{} not found, skipping", source.display());
                continue;
            }
            let stats = safe_copy_tree(source, &resolve_in_rootfs(rootfs, Path::new(dest))?)?;
            tracing::info!(
                "Copied {} -> /{} ({} files, {} skipped)",
                source.display(),
                dest,
                stats.files,
                stats.skipped
            );
        }
        Ok(())
    }

    /// Download the packages and their dependencies into the per-arch cache.
    pub fn download(&self, ctx: &BuildContext) -> Result<()> {
        if self.packages.is_empty() {
            tracing::warn!("No packages requested, skipping download");
            return Ok(());
        }
        let cache = ctx.pacman_cache();
        fs::create_dir_all(&cache)
            .with_context(|| format!("Failed to create {}", cache.display()))?;

        tracing::info!("Downloading packages into cache: {}", self.packages.join(", "));
        let cmd = PackageFetch {
            packages: self.packages.clone(),
            cache_dir: cache,
            sync_db: self.sync_db,
        }
        .command(ctx.tools)?;
        ctx.run(cmd)
    }

    /// Extract every cached archive in name order. Stops at the first failure.
    pub fn extract_all(&self, ctx: &BuildContext) -> Result<usize> {
        let rootfs = ctx.rootfs();
        fs::create_dir_all(&rootfs)
            .with_context(|| format!("Failed to create {}", rootfs.display()))?;

        let archives = cached_archives(&ctx.pacman_cache())?;
        if archives.is_empty() {
            tracing::warn!("No package archives in cache, nothing to extract");
            return Ok(0);
        }

        for archive in &archives {
            tracing::info!(
                "Extracting {}",
                archive.file_name().unwrap_or_default().to_string_lossy()
            );
            let cmd = PackageExtract {
                archive: archive.clone(),
                rootfs: rootfs.clone(),
            }
            .command(ctx.tools)?;
            ctx.run(cmd)?;
        }
        Ok(archives.len())
    }
}

/// Keep the first occurrence of each non-empty name.
pub fn dedup_packages<I, S>(packages: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    packages
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

pub fn is_package_archive(name: &str) -> bool {
    ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Package archives in `cache`, sorted by file name. A missing cache is empty.
pub fn cached_archives(cache: &Path) -> Result<Vec<PathBuf>> {
    if !cache.is_dir() {
        return Ok(Vec::new());
    }
    let mut archives = Vec::new();
    for entry in fs::read_dir(cache).with_context(|| format!("Failed to read {}", cache.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        if is_package_archive(&name.to_string_lossy()) && entry.file_type()?.is_file() {
            archives.push(entry.path());
        }
    }
    archives.sort();
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let pkgs = dedup_packages(["bash", "curl", "bash", " ", "coreutils", "curl"]);
        assert_eq!(pkgs, vec!["bash", "curl", "coreutils"]);
    }

    #[test]
    fn test_archive_name_matching() {
        assert!(is_package_archive("bash-5.2.026-2-x86_64.pkg.tar.zst"));
        assert!(is_package_archive("tzdata-2024a-1-any.pkg.tar.xz"));
        assert!(is_package_archive("old-1-1-any.pkg.tar"));
        assert!(!is_package_archive("bash-5.2.026-2-x86_64.pkg.tar.zst.sig"));
        assert!(!is_package_archive("bash-5.2.026-2-x86_64.pkg.tar.zst.part"));
        assert!(!is_package_archive("core.db"));
    }

    #[test]
    fn test_cached_archives_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        for name in [
            "zlib-1.3-1-x86_64.pkg.tar.zst",
            "bash-5.2-1-x86_64.pkg.tar.zst",
            "bash-5.2-1-x86_64.pkg.tar.zst.sig",
            "coreutils-9.4-1-x86_64.pkg.tar.xz",
        ] {
            fs::write(temp.path().join(name), b"").unwrap();
        }
        fs::create_dir(temp.path().join("dir.pkg.tar.zst")).unwrap();

        let names: Vec<String> = cached_archives(temp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "bash-5.2-1-x86_64.pkg.tar.zst",
                "coreutils-9.4-1-x86_64.pkg.tar.xz",
                "zlib-1.3-1-x86_64.pkg.tar.zst",
            ]
        );
        assert!(cached_archives(&temp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_pacman_conf_is_config_not_found() {
        let temp = TempDir::new().unwrap();
        let installer = PackageInstaller::new(["bash"]).with_sources(RepoConfigSources {
            pacman_conf: temp.path().join("pacman.conf"),
            pacman_d: temp.path().join("pacman.d"),
            pacman_share: temp.path().join("share"),
        });
        let err = installer
            .copy_repository_config(&temp.path().join("rootfs"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_copy_repository_config_skips_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let conf = temp.path().join("pacman.conf");
        fs::write(&conf, "[core]\nInclude = /etc/pacman.d/mirrorlist\n").unwrap();
        let mirrors = temp.path().join("pacman.d");
        fs::create_dir_all(&mirrors).unwrap();
        fs::write(mirrors.join("mirrorlist"), "Server = x\n").unwrap();

        let rootfs = temp.path().join("rootfs");
        PackageInstaller::new(["bash"])
            .with_sources(RepoConfigSources {
                pacman_conf: conf,
                pacman_d: mirrors,
                pacman_share: temp.path().join("no-share"),
            })
            .copy_repository_config(&rootfs)
            .unwrap();

        assert!(rootfs.join("etc/pacman.conf").is_file());
        assert!(rootfs.join("etc/pacman.d/mirrorlist").is_file());
        assert!(!rootfs.join("usr/share/pacman").exists());
    }

    #[test]
    fn test_repository_config_stays_inside_rootfs() {
        let temp = TempDir::new().unwrap();
        let conf = temp.path().join("pacman.conf");
        fs::write(&conf, "[options]\n").unwrap();
        let host_etc = temp.path().join("host_etc");
        fs::create_dir_all(&host_etc).unwrap();
        let rootfs = temp.path().join("rootfs");
        fs::create_dir_all(&rootfs).unwrap();
        std::os::unix::fs::symlink(&host_etc, rootfs.join("etc")).unwrap();

        PackageInstaller::new(["bash"])
            .with_sources(RepoConfigSources {
                pacman_conf: conf,
                pacman_d: temp.path().join("no-pacman.d"),
                pacman_share: temp.path().join("no-share"),
            })
            .copy_repository_config(&rootfs)
            .unwrap();

        assert_eq!(fs::read_dir(&host_etc).unwrap().count(), 0);
        let rerooted = rootfs.join(host_etc.strip_prefix("/").unwrap());
        assert!(rerooted.join("pacman.conf").is_file());
    }
}
