//! Supported target architectures and cross-compiler defaults.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// Architecture the build host compiles for without a cross toolchain.
pub const NATIVE_ARCH: &str = "x86_64";

/// A rootfs target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Arch {
    #[default]
    X86_64,
    X86_64Efi,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::X86_64, Arch::X86_64Efi, Arch::Arm64];

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86_64Efi => "x86_64-efi",
            Arch::Arm64 => "arm64",
        }
    }

    /// Directory under `work/rootfs` (and the other per-arch trees).
    pub fn rootfs_subdir(self) -> &'static str {
        self.name()
    }

    /// Value passed to make as `ARCH`.
    pub fn kernel_arch(self) -> &'static str {
        match self {
            Arch::X86_64 | Arch::X86_64Efi => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// qemu-user helper needed to run target binaries on the host, if any.
    pub fn qemu_user_binary(self) -> Option<&'static str> {
        match self {
            Arch::X86_64 | Arch::X86_64Efi => None,
            Arch::Arm64 => Some("qemu-aarch64-static"),
        }
    }

    pub fn is_native(self) -> bool {
        self.kernel_arch() == NATIVE_ARCH
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "x86_64-efi" => Ok(Arch::X86_64Efi),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => bail!(
                "Unknown architecture '{}'. Supported: {}",
                other,
                Arch::ALL.map(Arch::name).join(", ")
            ),
        }
    }
}

/// Default cross-compiler prefix for a make `ARCH` value.
pub fn default_compiler_prefix(arch: &str) -> String {
    match arch {
        "arm64" | "aarch64" => "aarch64-linux-gnu-".to_string(),
        "arm" => "arm-linux-gnueabihf-".to_string(),
        "riscv64" => "riscv64-linux-gnu-".to_string(),
        other => format!("{}-linux-gnu-", other),
    }
}

/// Effective `CROSS_COMPILE` for `arch`.
///
/// Native builds never use a prefix. Otherwise an explicit prefix is used
/// exactly as given, even when empty (a native arm64 host, or `CC` set by hand).
pub fn resolve_compiler_prefix(arch: &str, explicit: Option<&str>) -> String {
    if arch == NATIVE_ARCH {
        return String::new();
    }
    match explicit {
        Some(prefix) => prefix.to_string(),
        None => default_compiler_prefix(arch),
    }
}
