//! BusyBox build: fetch, configure, cross-compile and install into the rootfs.

pub mod config;
pub mod fetch;

pub use config::{
    apply_config_options, parse_patch_list, patch_config_file, resolve_config_layers,
    ConfigOptions, CrossCompile, ToolboxBuildConfig, DEFAULT_CONFIG,
};

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::arch::{resolve_compiler_prefix, Arch};
use crate::context::BuildContext;
use crate::error::BuildError;
use crate::fhs::{relative_path, resolve_in_rootfs, resolve_parent_in_rootfs, rootfs_path};
use crate::tools::{MakeEnv, MakeInvocation, MakeTarget, UnpackTarball};

/// Result of wiring `sbin/init` and `bin/sh` to the installed binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkOutcome {
    /// `true` for each link created now, `false` where something was already there.
    Created { init: bool, sh: bool },
    /// `bin/busybox` was not installed, nothing linked.
    BinaryMissing,
}

pub struct ToolboxBuilder {
    config: ToolboxBuildConfig,
}

impl ToolboxBuilder {
    pub fn new(config: ToolboxBuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolboxBuildConfig {
        &self.config
    }

    /// Run the whole build. Any tool failure aborts with no retry.
    pub fn build(&self, ctx: &BuildContext) -> Result<SymlinkOutcome> {
        let download = ctx.paths.download();
        let work = ctx.build_dir();
        let rootfs = ctx.rootfs();
        for dir in [&download, &work, &rootfs] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let tarball = download.join(self.config.tarball_name());
        fetch::fetch_tarball(
            ctx,
            &self.config.urls,
            &tarball,
            self.config.sha256.as_deref(),
        )?;

        let source_dir = self.extract(ctx, &tarball, &work)?;
        mark_scripts_executable(&source_dir)?;

        let env = self.make_env(ctx.arch);
        tracing::info!(
            "Building BusyBox {} for {} (CROSS_COMPILE='{}')",
            self.config.version,
            env.arch,
            env.cross_compile
        );
        let make = |target: MakeTarget| -> Result<()> {
            let cmd = MakeInvocation {
                source_dir: source_dir.clone(),
                target,
                env: env.clone(),
            }
            .command(ctx.tools)?;
            ctx.run(cmd)
        };

        make(MakeTarget::Defconfig)?;
        patch_config_file(&source_dir, &self.config.effective_options())?;
        make(MakeTarget::Oldconfig)?;
        make(MakeTarget::Compile { jobs: job_count() })?;

        let prefix = self.install_prefix(&rootfs)?;
        make(MakeTarget::Install {
            prefix: prefix.clone(),
        })?;

        let outcome = create_symlinks(&rootfs, &prefix)?;
        tracing::info!("BusyBox {} installed into {}", self.config.version, prefix.display());
        Ok(outcome)
    }

    fn extract(&self, ctx: &BuildContext, tarball: &Path, work: &Path) -> Result<PathBuf> {
        let source_dir = work.join(self.config.source_dir_name());
        if source_dir.is_dir() {
            tracing::info!("Source already extracted at {}", source_dir.display());
            return Ok(source_dir);
        }

        tracing::info!("Extracting {}...", tarball.display());
        let cmd = UnpackTarball {
            archive: tarball.to_path_buf(),
            dest_dir: work.to_path_buf(),
        }
        .command(ctx.tools)?;
        ctx.run(cmd)?;

        if !source_dir.is_dir() {
            return Err(BuildError::MissingArtifact {
                what: "extracted BusyBox source".to_string(),
                path: source_dir,
            }
            .into());
        }
        Ok(source_dir)
    }

    /// Environment for every make step. The rootfs architecture decides `ARCH`.
    pub fn make_env(&self, arch: Arch) -> MakeEnv {
        let cross = &self.config.cross_compile;
        let target = arch.kernel_arch();

        if let Some(configured) = cross.arch.as_deref() {
            let same = configured
                .parse::<Arch>()
                .map(|a| a.kernel_arch() == target)
                .unwrap_or(configured == target);
            if !same {
                tracing::warn!(
                    "cross_compile.arch '{}' ignored, building for {}",
                    configured,
                    target
                );
            }
        }

        MakeEnv {
            arch: target.to_string(),
            cross_compile: resolve_compiler_prefix(target, cross.compiler_prefix.as_deref()),
            cflags: cross.cflags.clone(),
            ldflags: cross.ldflags.clone(),
        }
    }

    fn install_prefix(&self, rootfs: &Path) -> Result<PathBuf> {
        match &self.config.install_prefix {
            Some(prefix) if !config::is_rootfs_root(prefix) => {
                Ok(rootfs.join(rootfs_path(&prefix.to_string_lossy())?))
            }
            _ => Ok(rootfs.to_path_buf()),
        }
    }
}

fn job_count() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            tracing::warn!("Could not detect CPU count ({}), using 4 jobs", e);
            4
        }
    }
}

/// Add the execute bits to every file under `<source>/scripts`.
pub fn mark_scripts_executable(source_dir: &Path) -> Result<()> {
    let scripts = source_dir.join("scripts");
    if !scripts.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(&scripts) {
        let entry = entry.with_context(|| format!("Failed to walk {}", scripts.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let mode = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .permissions()
            .mode();
        fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o111))
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
    }
    Ok(())
}

/// Point the rootfs's `sbin/init` and `bin/sh` at `<prefix>/bin/busybox`.
///
/// Link targets are relative, so they resolve the same inside and outside a
/// chroot. Existing entries are left alone. A missing binary only warns.
pub fn create_symlinks(rootfs: &Path, prefix: &Path) -> Result<SymlinkOutcome> {
    let busybox = prefix.join("bin/busybox");
    if !busybox.is_file() {
        tracing::warn!(
            "BusyBox binary not found at {}, skipping symlinks",
            busybox.display()
        );
        return Ok(SymlinkOutcome::BinaryMissing);
    }

    let init = link_if_absent(rootfs, Path::new("sbin/init"), &busybox)?;
    let sh = link_if_absent(rootfs, Path::new("bin/sh"), &busybox)?;
    Ok(SymlinkOutcome::Created { init, sh })
}

/// Create `<rootfs>/<link>` pointing at `binary` unless something is already there.
fn link_if_absent(rootfs: &Path, link: &Path, binary: &Path) -> Result<bool> {
    let link = resolve_parent_in_rootfs(rootfs, link)?;
    if link.symlink_metadata().is_ok() {
        return Ok(false);
    }

    let under_rootfs = |path: &Path| -> Result<PathBuf> {
        path.strip_prefix(rootfs)
            .map(Path::to_path_buf)
            .with_context(|| format!("{} is outside {}", path.display(), rootfs.display()))
    };
    let binary = resolve_in_rootfs(rootfs, &under_rootfs(binary)?)?;
    let link_dir = link.parent().unwrap_or(rootfs);
    let target = relative_path(&under_rootfs(link_dir)?, &under_rootfs(&binary)?);

    fs::create_dir_all(link_dir)
        .with_context(|| format!("Failed to create {}", link_dir.display()))?;
    std::os::unix::fs::symlink(&target, &link).with_context(|| {
        format!(
            "Failed to create symlink {} -> {}",
            link.display(),
            target.display()
        )
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> ToolboxBuildConfig {
        ToolboxBuildConfig {
            version: "1.36.1".into(),
            urls: vec!["https://busybox.net/downloads/busybox-1.36.1.tar.bz2".into()],
            sha256: None,
            cross_compile: CrossCompile::default(),
            config_patch: Vec::new(),
            extra_config: Vec::new(),
            install_prefix: None,
        }
    }

    #[test]
    fn test_make_env_native_has_no_prefix() {
        let mut cfg = config();
        cfg.cross_compile.compiler_prefix = Some("aarch64-linux-gnu-".into());
        let env = ToolboxBuilder::new(cfg).make_env(Arch::X86_64);
        assert_eq!(env.arch, "x86_64");
        assert_eq!(env.cross_compile, "");
    }

    #[test]
    fn test_make_env_arm64_default_and_explicit() {
        let env = ToolboxBuilder::new(config()).make_env(Arch::Arm64);
        assert_eq!(env.arch, "arm64");
        assert_eq!(env.cross_compile, "aarch64-linux-gnu-");

        let mut cfg = config();
        cfg.cross_compile.arch = Some("aarch64".into());
        cfg.cross_compile.compiler_prefix = Some("aarch64-none-linux-gnu-".into());
        cfg.cross_compile.cflags = "-Os".into();
        let env = ToolboxBuilder::new(cfg).make_env(Arch::Arm64);
        assert_eq!(env.cross_compile, "aarch64-none-linux-gnu-");
        assert_eq!(env.cflags, "-Os");
    }

    #[test]
    fn test_install_prefix() {
        let rootfs = Path::new("/w/rootfs/x86_64");
        let builder = ToolboxBuilder::new(config());
        assert_eq!(builder.install_prefix(rootfs).unwrap(), rootfs);

        let mut cfg = config();
        cfg.install_prefix = Some(PathBuf::from("/opt/busybox"));
        assert_eq!(
            ToolboxBuilder::new(cfg).install_prefix(rootfs).unwrap(),
            rootfs.join("opt/busybox")
        );

        let mut cfg = config();
        cfg.install_prefix = Some(PathBuf::from("/"));
        assert_eq!(ToolboxBuilder::new(cfg).install_prefix(rootfs).unwrap(), rootfs);
    }

    #[test]
    fn test_mark_scripts_executable() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("scripts/kconfig/mkconfigs");
        fs::create_dir_all(script.parent().unwrap()).unwrap();
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o640)).unwrap();

        mark_scripts_executable(temp.path()).unwrap();

        let mode = fs::metadata(&script).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o751);
    }

    #[test]
    fn test_symlinks_skipped_without_binary() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            create_symlinks(temp.path(), temp.path()).unwrap(),
            SymlinkOutcome::BinaryMissing
        );
        assert!(!temp.path().join("bin/sh").exists());
    }

    #[test]
    fn test_symlinks_keep_existing_entries() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        fs::write(temp.path().join("bin/busybox"), b"\x7fELF").unwrap();
        std::os::unix::fs::symlink("bash", temp.path().join("bin/sh")).unwrap();

        let outcome = create_symlinks(temp.path(), temp.path()).unwrap();
        assert_eq!(outcome, SymlinkOutcome::Created { init: true, sh: false });
        assert_eq!(
            fs::read_link(temp.path().join("sbin/init")).unwrap(),
            PathBuf::from("../bin/busybox")
        );
        assert_eq!(
            fs::read_link(temp.path().join("bin/sh")).unwrap(),
            PathBuf::from("bash")
        );
    }

    #[test]
    fn test_symlinks_at_rootfs_root_for_custom_prefix() {
        let temp = TempDir::new().unwrap();
        let rootfs = temp.path();
        let prefix = rootfs.join("opt/busybox");
        fs::create_dir_all(prefix.join("bin")).unwrap();
        fs::write(prefix.join("bin/busybox"), b"\x7fELF").unwrap();

        let outcome = create_symlinks(rootfs, &prefix).unwrap();

        assert_eq!(outcome, SymlinkOutcome::Created { init: true, sh: true });
        assert_eq!(
            fs::read_link(rootfs.join("sbin/init")).unwrap(),
            PathBuf::from("../opt/busybox/bin/busybox")
        );
        assert_eq!(
            fs::read_link(rootfs.join("bin/sh")).unwrap(),
            PathBuf::from("../opt/busybox/bin/busybox")
        );
        assert!(rootfs.join("sbin/init").is_file());
        assert!(!prefix.join("sbin/init").exists());
    }

    #[test]
    fn test_symlinks_follow_merged_usr_links() {
        let temp = TempDir::new().unwrap();
        let rootfs = temp.path();
        fs::create_dir_all(rootfs.join("usr/bin")).unwrap();
        fs::create_dir_all(rootfs.join("usr/sbin")).unwrap();
        std::os::unix::fs::symlink("usr/bin", rootfs.join("bin")).unwrap();
        std::os::unix::fs::symlink("usr/sbin", rootfs.join("sbin")).unwrap();
        fs::write(rootfs.join("usr/bin/busybox"), b"\x7fELF").unwrap();

        create_symlinks(rootfs, rootfs).unwrap();

        assert_eq!(
            fs::read_link(rootfs.join("usr/sbin/init")).unwrap(),
            PathBuf::from("../bin/busybox")
        );
        assert_eq!(
            fs::read_link(rootfs.join("usr/bin/sh")).unwrap(),
            PathBuf::from("busybox")
        );
    }
}
