//! Configuration management for rootfs-builder.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::arch::Arch;
use crate::packages::{RepoConfigSources, DEFAULT_PACKAGES};
use crate::tools::HostTools;

/// Default per-command deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

pub const DEFAULT_FHS_LAYOUT: &str = "configs/rootfs/default_fhs.yaml";
pub const DEFAULT_TOOLBOX_CONFIG: &str = "configs/busybox.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace root; the tree lives in `<workspace>/work`.
    pub workspace: PathBuf,
    pub fhs_layout: PathBuf,
    pub toolbox_config: PathBuf,
    pub arch: Arch,
    pub packages: Vec<String>,
    /// `None` disables the deadline.
    pub command_timeout: Option<Duration>,
    pub sync_db: bool,
    pub repo: RepoConfigSources,
    pub tools: HostTools,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.is_file() {
            let entries = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for entry in entries {
                let (key, value) =
                    entry.with_context(|| format!("Invalid line in {}", env_path.display()))?;
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        Self::from_map(base_dir, &env_vars)
    }

    /// Build a configuration from already-collected variables.
    pub fn from_map(base_dir: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let path_or = |key: &str, default: &str| {
            resolve_path(base_dir, get(key).unwrap_or(default))
        };

        let arch = match get("ROOTFS_ARCH") {
            Some(value) => value.parse().context("Invalid ROOTFS_ARCH")?,
            None => Arch::default(),
        };

        let mut packages: Vec<String> = match get("ROOTFS_PACKAGES") {
            Some(list) => split_list(list),
            None => DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
        };
        if let Some(extra) = get("ROOTFS_EXTRA_PACKAGES") {
            packages.extend(split_list(extra));
        }

        let command_timeout = match get("ROOTFS_COMMAND_TIMEOUT") {
            None => Some(DEFAULT_COMMAND_TIMEOUT),
            Some(secs) => {
                let secs: u64 = secs
                    .parse()
                    .with_context(|| format!("Invalid ROOTFS_COMMAND_TIMEOUT '{}'", secs))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let sync_db = match get("ROOTFS_SYNC_DB") {
            None => false,
            Some(value) => parse_bool(value).context("Invalid ROOTFS_SYNC_DB")?,
        };

        let defaults = RepoConfigSources::default();
        let repo = RepoConfigSources {
            pacman_conf: get("PACMAN_CONF")
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or(defaults.pacman_conf),
            pacman_d: get("PACMAN_D")
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or(defaults.pacman_d),
            pacman_share: get("PACMAN_SHARE")
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or(defaults.pacman_share),
        };

        let host = HostTools::default();
        let tool = |key: &str, default: String| get(key).map(String::from).unwrap_or(default);
        let tools = HostTools {
            make: tool("ROOTFS_MAKE", host.make),
            curl: tool("ROOTFS_CURL", host.curl),
            tar: tool("ROOTFS_TAR", host.tar),
            pacman: tool("ROOTFS_PACMAN", host.pacman),
            bsdtar: tool("ROOTFS_BSDTAR", host.bsdtar),
        };

        Ok(Self {
            workspace: get("ROOTFS_WORKSPACE")
                .map(|p| resolve_path(base_dir, p))
                .unwrap_or_else(|| base_dir.to_path_buf()),
            fhs_layout: path_or("ROOTFS_FHS_LAYOUT", DEFAULT_FHS_LAYOUT),
            toolbox_config: path_or("ROOTFS_TOOLBOX_CONFIG", DEFAULT_TOOLBOX_CONFIG),
            arch,
            packages,
            command_timeout,
            sync_db,
            repo,
            tools,
        })
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  ROOTFS_WORKSPACE: {}", self.workspace.display());
        println!("  ROOTFS_FHS_LAYOUT: {}", self.fhs_layout.display());
        println!("  ROOTFS_TOOLBOX_CONFIG: {}", self.toolbox_config.display());
        println!("  ROOTFS_ARCH: {}", self.arch);
        println!("  ROOTFS_PACKAGES: {}", self.packages.join(","));
        match self.command_timeout {
            Some(t) => println!("  ROOTFS_COMMAND_TIMEOUT: {}s", t.as_secs()),
            None => println!("  ROOTFS_COMMAND_TIMEOUT: disabled"),
        }
        println!("  ROOTFS_SYNC_DB: {}", self.sync_db);
        println!("  PACMAN_CONF: {}", self.repo.pacman_conf.display());
        println!("  PACMAN_D: {}", self.repo.pacman_d.display());
        println!("  PACMAN_SHARE: {}", self.repo.pacman_share.display());
        for (name, program) in self.tools.programs() {
            println!("  {}: {}", name, program);
        }
        for (label, path) in [
            ("FHS layout", &self.fhs_layout),
            ("Toolbox config", &self.toolbox_config),
        ] {
            if path.is_file() {
                println!("  {}: FOUND", label);
            } else {
                println!("  {}: NOT FOUND", label);
            }
        }
    }
}

/// `~/x` expands to the home directory, relative paths resolve against `base_dir`.
pub fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Comma or whitespace separated list.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let base = Path::new("/srv/rootfs");
        let config = Config::from_map(base, &HashMap::new()).unwrap();

        assert_eq!(config.workspace, base);
        assert_eq!(config.fhs_layout, base.join(DEFAULT_FHS_LAYOUT));
        assert_eq!(config.arch, Arch::X86_64);
        assert_eq!(config.packages.len(), DEFAULT_PACKAGES.len());
        assert_eq!(config.command_timeout, Some(DEFAULT_COMMAND_TIMEOUT));
        assert!(!config.sync_db);
        assert_eq!(config.tools, HostTools::default());
        assert_eq!(config.repo, RepoConfigSources::default());
    }

    #[test]
    fn test_overrides() {
        let base = Path::new("/srv/rootfs");
        let config = Config::from_map(
            base,
            &vars(&[
                ("ROOTFS_WORKSPACE", "build-area"),
                ("ROOTFS_ARCH", "aarch64"),
                ("ROOTFS_PACKAGES", "bash, coreutils"),
                ("ROOTFS_EXTRA_PACKAGES", "vim"),
                ("ROOTFS_COMMAND_TIMEOUT", "0"),
                ("ROOTFS_SYNC_DB", "yes"),
                ("PACMAN_CONF", "/tmp/pacman.conf"),
                ("ROOTFS_BSDTAR", "/opt/bsdtar"),
            ]),
        )
        .unwrap();

        assert_eq!(config.workspace, base.join("build-area"));
        assert_eq!(config.arch, Arch::Arm64);
        assert_eq!(config.packages, vec!["bash", "coreutils", "vim"]);
        assert_eq!(config.command_timeout, None);
        assert!(config.sync_db);
        assert_eq!(config.repo.pacman_conf, PathBuf::from("/tmp/pacman.conf"));
        assert_eq!(config.tools.bsdtar, "/opt/bsdtar");
        assert_eq!(config.tools.make, "make");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let base = Path::new("/srv");
        assert!(Config::from_map(base, &vars(&[("ROOTFS_ARCH", "sparc")])).is_err());
        assert!(Config::from_map(base, &vars(&[("ROOTFS_COMMAND_TIMEOUT", "soon")])).is_err());
        assert!(Config::from_map(base, &vars(&[("ROOTFS_SYNC_DB", "maybe")])).is_err());
    }

    #[test]
    fn test_resolve_path_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_path(Path::new("/x"), "~/ws"), home.join("ws"));
        }
        assert_eq!(resolve_path(Path::new("/x"), "/abs"), PathBuf::from("/abs"));
    }

    #[test]
    #[serial]
    fn test_load_env_file_and_environment_precedence() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(".env"),
            "# comment\nROOTFS_ARCH=arm64\nROOTFS_TOOLBOX_CONFIG=\"cfg/bb.yaml\"\nROOTFS_SYNC_DB=1\n",
        )
        .unwrap();

        std::env::set_var("ROOTFS_ARCH", "x86_64-efi");
        let config = Config::load(temp.path());
        std::env::remove_var("ROOTFS_ARCH");
        let config = config.unwrap();

        assert_eq!(config.arch, Arch::X86_64Efi);
        assert_eq!(config.toolbox_config, temp.path().join("cfg/bb.yaml"));
        assert!(config.sync_db);
    }

    #[test]
    #[serial]
    fn test_load_without_env_file() {
        let temp = TempDir::new().unwrap();
        std::env::remove_var("ROOTFS_WORKSPACE");
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.workspace, temp.path());
    }
}
