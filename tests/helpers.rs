//! Shared test utilities for rootfs-builder tests.
//!
//! Host tools are replaced by small shell scripts so the pipeline can run
//! end to end without network access, a compiler or pacman.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use rootfs_builder::config::Config;
use rootfs_builder::packages::RepoConfigSources;
use rootfs_builder::tools::HostTools;
use rootfs_builder::workspace::WorkspacePaths;

pub const BUSYBOX_VERSION: &str = "1.36.1";

/// Test environment: a workspace, an input directory and a directory of mock tools.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Stands in for the project root (layouts, toolbox configs, host repo config)
    pub base_dir: PathBuf,
    /// Workspace root handed to `WorkspacePaths`
    pub workspace: PathBuf,
    /// Mock host tools live here
    pub bin_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let base_dir = base.join("project");
        let workspace = base.join("workspace");
        let bin_dir = base.join("bin");
        for dir in [&base_dir, &workspace, &bin_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            base_dir,
            workspace,
            bin_dir,
        }
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(&self.workspace).expect("Failed to create workspace")
    }

    /// Write an executable `#!/bin/sh` script and return its absolute path.
    pub fn write_mock_tool(&self, name: &str, body: &str) -> String {
        let path = self.bin_dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write mock tool");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod mock tool");
        path.to_string_lossy().into_owned()
    }

    /// A full set of working mock tools.
    pub fn mock_tools(&self) -> HostTools {
        HostTools {
            make: self.write_mock_tool("make", MOCK_MAKE),
            curl: self.write_mock_tool("curl", MOCK_CURL),
            tar: self.write_mock_tool("tar", &mock_source_tar(BUSYBOX_VERSION)),
            pacman: self.write_mock_tool("pacman", MOCK_PACMAN),
            bsdtar: self.write_mock_tool("bsdtar", MOCK_BSDTAR),
        }
    }

    /// Fake host repository config: pacman.conf, a mirrorlist and a keyring.
    pub fn repo_sources(&self) -> RepoConfigSources {
        let host = self.base_dir.join("host");
        let pacman_d = host.join("etc/pacman.d");
        let pacman_share = host.join("usr/share/pacman");
        fs::create_dir_all(&pacman_d).expect("Failed to create pacman.d");
        fs::create_dir_all(pacman_share.join("keyrings")).expect("Failed to create keyrings");
        fs::write(host.join("etc/pacman.conf"), "[options]\nArchitecture = auto\n")
            .expect("Failed to write pacman.conf");
        fs::write(
            pacman_d.join("mirrorlist"),
            "Server = https://mirror.example/$repo/os/$arch\n",
        )
        .expect("Failed to write mirrorlist");
        fs::write(pacman_share.join("keyrings/archlinux.gpg"), b"keyring")
            .expect("Failed to write keyring");

        RepoConfigSources {
            pacman_conf: host.join("etc/pacman.conf"),
            pacman_d,
            pacman_share,
        }
    }

    /// Write a file under the project directory and return its path.
    pub fn write_input(&self, name: &str, content: &str) -> PathBuf {
        let path = self.base_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create input dir");
        }
        fs::write(&path, content).expect("Failed to write input");
        path
    }

    /// Configuration wired to this environment: mock tools, fake repo config,
    /// the given packages and a short command deadline.
    pub fn config(&self, packages: &[&str]) -> Config {
        let mut config =
            Config::from_map(&self.base_dir, &HashMap::new()).expect("Failed to build config");
        config.workspace = self.workspace.clone();
        config.packages = packages.iter().map(|p| p.to_string()).collect();
        config.command_timeout = Some(std::time::Duration::from_secs(60));
        config.repo = self.repo_sources();
        config.tools = self.mock_tools();
        config
    }
}

/// `make`: defconfig writes a `.config`, install drops a binary under CONFIG_PREFIX.
pub const MOCK_MAKE: &str = r#"
for arg in "$@"; do
  case "$arg" in
    defconfig)
      printf '# CONFIG_STATIC is not set\nCONFIG_TC=y\nCONFIG_ASH=y\n' > .config
      echo "  HOSTCC  scripts/basic/fixdep"
      ;;
    CONFIG_PREFIX=*)
      prefix="${arg#CONFIG_PREFIX=}"
      ;;
    install)
      mkdir -p "$prefix/bin"
      printf 'busybox built for %s\n' "$ARCH" > "$prefix/bin/busybox"
      chmod 755 "$prefix/bin/busybox"
      ;;
  esac
done
"#;

/// `curl -fL --silent --show-error -o DEST URL`: URLs containing "bad" fail.
pub const MOCK_CURL: &str = r#"
dest="$5"
url="$6"
case "$url" in
  *bad*)
    echo "curl: (22) The requested URL returned error: 404" >&2
    exit 22
    ;;
esac
printf 'tarball from %s\n' "$url" > "$dest"
"#;

/// `pacman -Sw --noconfirm --cachedir DIR PKG...`: one real tar archive per package.
pub const MOCK_PACMAN: &str = r#"
cache="$4"
shift 4
for pkg in "$@"; do
  stage="$(mktemp -d)"
  mkdir -p "$stage/usr/bin"
  printf '#!/bin/sh\necho %s\n' "$pkg" > "$stage/usr/bin/$pkg"
  printf 'pkgname = %s\n' "$pkg" > "$stage/.PKGINFO"
  tar -cf "$cache/$pkg-1.0-1-x86_64.pkg.tar.zst" -C "$stage" .PKGINFO usr
  rm -rf "$stage"
  echo ":: downloading $pkg"
done
"#;

/// `bsdtar -xpf ARCHIVE -C ROOTFS --exclude=...`, backed by the system tar.
pub const MOCK_BSDTAR: &str = r#"
tar -xpf "$2" -C "$4" --exclude=.PKGINFO --exclude=.MTREE --exclude=.BUILDINFO --exclude=.INSTALL
"#;

/// `tar -xf ARCHIVE -C DIR`: lays out an empty BusyBox source tree.
pub fn mock_source_tar(version: &str) -> String {
    format!(
        r#"
src="$4/busybox-{version}"
mkdir -p "$src/scripts/kconfig"
printf 'echo gen\n' > "$src/scripts/gen_build_files.sh"
printf 'echo conf\n' > "$src/scripts/kconfig/mkconfigs"
chmod 644 "$src/scripts/gen_build_files.sh" "$src/scripts/kconfig/mkconfigs"
"#
    )
}

/// Toolbox config JSON with the given mirror list.
pub fn toolbox_json(urls: &[&str]) -> String {
    let urls: Vec<String> = urls.iter().map(|u| format!("\"{}\"", u)).collect();
    format!(
        r#"{{
  "version": "{}",
  "urls": [{}],
  "cross_compile": {{ "cflags": "-Os", "ldflags": "-static" }},
  "config_patch": ["CONFIG_STATIC=y"],
  "extra_config": {{ "CONFIG_TC": "n" }}
}}"#,
        BUSYBOX_VERSION,
        urls.join(", ")
    )
}

/// Assert that a path is a symlink with the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a directory exists.
pub fn assert_dir_exists(path: &Path) {
    assert!(
        path.is_dir(),
        "Expected directory to exist: {}",
        path.display()
    );
}

/// Assert that nothing exists at a path (not even a dangling symlink).
pub fn assert_absent(path: &Path) {
    assert!(
        path.symlink_metadata().is_err(),
        "Expected nothing at {}",
        path.display()
    );
}
