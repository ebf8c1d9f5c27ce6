//! Typed invocations of the host tools the build shells out to.
//!
//! Each invocation is a plain value that is validated before it turns into a
//! [`Cmd`]. Program names come from [`HostTools`], so a test (or a user with a
//! non-standard host) can point any of them somewhere else.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Members of a pacman package that must not land in the rootfs.
pub const PACKAGE_METADATA_MEMBERS: &[&str] = &[".PKGINFO", ".MTREE", ".BUILDINFO", ".INSTALL"];

/// Programs used for each external concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTools {
    pub make: String,
    pub curl: String,
    pub tar: String,
    pub pacman: String,
    pub bsdtar: String,
}

impl Default for HostTools {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
            curl: "curl".to_string(),
            tar: "tar".to_string(),
            pacman: "pacman".to_string(),
            bsdtar: "bsdtar".to_string(),
        }
    }
}

impl HostTools {
    /// (name, program) pairs, in the order preflight reports them.
    pub fn programs(&self) -> [(&'static str, &str); 5] {
        [
            ("make", self.make.as_str()),
            ("curl", self.curl.as_str()),
            ("tar", self.tar.as_str()),
            ("bsdtar", self.bsdtar.as_str()),
            ("pacman", self.pacman.as_str()),
        ]
    }
}

fn require_absolute(what: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{} path is empty", what);
    }
    if !path.is_absolute() {
        bail!("{} must be an absolute path, got {}", what, path.display());
    }
    Ok(())
}

/// Download one URL to a file.
#[derive(Debug, Clone)]
pub struct FetchArchive {
    pub url: String,
    pub dest: PathBuf,
}

impl FetchArchive {
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            bail!("download URL is empty");
        }
        if !url.contains("://") {
            bail!("download URL '{}' has no scheme", url);
        }
        require_absolute("download destination", &self.dest)
    }

    pub fn command(&self, tools: &HostTools) -> Result<Cmd> {
        self.validate()?;
        Ok(Cmd::new(&tools.curl)
            .args(["-fL", "--silent", "--show-error", "-o"])
            .arg_path(&self.dest)
            .arg(self.url.trim())
            .step(format!("download of {}", self.url.trim())))
    }
}

/// Unpack a source tarball into a directory.
#[derive(Debug, Clone)]
pub struct UnpackTarball {
    pub archive: PathBuf,
    pub dest_dir: PathBuf,
}

impl UnpackTarball {
    pub fn validate(&self) -> Result<()> {
        require_absolute("tarball", &self.archive)?;
        require_absolute("extraction directory", &self.dest_dir)?;
        if !self.archive.is_file() {
            bail!("tarball {} does not exist", self.archive.display());
        }
        Ok(())
    }

    pub fn command(&self, tools: &HostTools) -> Result<Cmd> {
        self.validate()?;
        Ok(Cmd::new(&tools.tar)
            .arg("-xf")
            .arg_path(&self.archive)
            .arg("-C")
            .arg_path(&self.dest_dir)
            .step("source extraction"))
    }
}

/// A make target run inside a Kconfig source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakeTarget {
    Defconfig,
    /// `oldconfig` with `KCONFIG_ALLCONFIG=/dev/null`, so no prompts.
    Oldconfig,
    Compile { jobs: usize },
    Install { prefix: PathBuf },
}

/// Cross-compile environment handed to every make invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeEnv {
    pub arch: String,
    pub cross_compile: String,
    pub cflags: String,
    pub ldflags: String,
}

#[derive(Debug, Clone)]
pub struct MakeInvocation {
    pub source_dir: PathBuf,
    pub target: MakeTarget,
    pub env: MakeEnv,
}

impl MakeInvocation {
    pub fn validate(&self) -> Result<()> {
        require_absolute("make source directory", &self.source_dir)?;
        if self.env.arch.trim().is_empty() {
            bail!("make ARCH is empty");
        }
        match &self.target {
            MakeTarget::Compile { jobs: 0 } => bail!("make job count must be at least 1"),
            MakeTarget::Install { prefix } => require_absolute("install prefix", prefix),
            _ => Ok(()),
        }
    }

    pub fn command(&self, tools: &HostTools) -> Result<Cmd> {
        self.validate()?;
        let cmd = Cmd::new(&tools.make)
            .dir(&self.source_dir)
            .env("ARCH", &self.env.arch)
            .env("CROSS_COMPILE", &self.env.cross_compile)
            .env("CFLAGS", &self.env.cflags)
            .env("LDFLAGS", &self.env.ldflags);

        let cmd = match &self.target {
            MakeTarget::Defconfig => cmd.arg("defconfig").step("make defconfig"),
            MakeTarget::Oldconfig => cmd
                .args(["oldconfig", "KCONFIG_ALLCONFIG=/dev/null"])
                .step("make oldconfig"),
            MakeTarget::Compile { jobs } => cmd.arg(format!("-j{}", jobs)).step("compile"),
            MakeTarget::Install { prefix } => cmd
                .arg(format!("CONFIG_PREFIX={}", prefix.display()))
                .arg("install")
                .step("make install"),
        };
        Ok(cmd)
    }
}

/// Download packages (and their dependencies) into a cache without installing.
#[derive(Debug, Clone)]
pub struct PackageFetch {
    pub packages: Vec<String>,
    pub cache_dir: PathBuf,
    pub sync_db: bool,
}

impl PackageFetch {
    pub fn validate(&self) -> Result<()> {
        require_absolute("package cache", &self.cache_dir)?;
        if self.packages.is_empty() {
            bail!("no packages to download");
        }
        for name in &self.packages {
            if name.trim().is_empty() || name.starts_with('-') || name.contains(char::is_whitespace) {
                bail!("invalid package name '{}'", name);
            }
        }
        Ok(())
    }

    pub fn command(&self, tools: &HostTools) -> Result<Cmd> {
        self.validate()?;
        let op = if self.sync_db { "-Syw" } else { "-Sw" };
        Ok(Cmd::new(&tools.pacman)
            .args([op, "--noconfirm", "--cachedir"])
            .arg_path(&self.cache_dir)
            .args(&self.packages)
            .step("package download"))
    }
}

/// Extract one package archive into the rootfs, skipping metadata members.
#[derive(Debug, Clone)]
pub struct PackageExtract {
    pub archive: PathBuf,
    pub rootfs: PathBuf,
}

impl PackageExtract {
    pub fn validate(&self) -> Result<()> {
        require_absolute("package archive", &self.archive)?;
        require_absolute("rootfs", &self.rootfs)?;
        if !self.rootfs.is_dir() {
            bail!("rootfs {} is not a directory", self.rootfs.display());
        }
        Ok(())
    }

    pub fn command(&self, tools: &HostTools) -> Result<Cmd> {
        self.validate()?;
        let name = self
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut cmd = Cmd::new(&tools.bsdtar)
            .arg("-xpf")
            .arg_path(&self.archive)
            .arg("-C")
            .arg_path(&self.rootfs);
        for member in PACKAGE_METADATA_MEMBERS {
            cmd = cmd.arg(format!("--exclude={}", member));
        }
        Ok(cmd.step(format!("extraction of {}", name)))
    }
}
