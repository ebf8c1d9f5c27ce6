//! Host tool availability checks.

use crate::arch::{resolve_compiler_prefix, Arch};
use crate::tools::HostTools;

use super::types::CheckResult;

/// Distribution package providing each tool, for the hint.
fn package_hint(tool: &str) -> &'static str {
    match tool {
        "make" => "make",
        "curl" => "curl",
        "tar" => "tar",
        "bsdtar" => "libarchive",
        "pacman" => "pacman",
        _ => "",
    }
}

/// Every configured tool must resolve to an executable.
pub fn check_host_tools(tools: &HostTools) -> Vec<CheckResult> {
    tools
        .programs()
        .into_iter()
        .map(|(name, program)| match which::which(program) {
            Ok(path) => CheckResult::pass_with(name, &path.display().to_string()),
            Err(_) => CheckResult::fail(
                name,
                &format!(
                    "'{}' not found. Install the '{}' package or set ROOTFS_{}.",
                    program,
                    package_hint(name),
                    name.to_uppercase()
                ),
            ),
        })
        .collect()
}

/// Non-native targets need `<prefix>gcc` on the host.
pub fn check_cross_compiler(arch: Arch, explicit_prefix: Option<&str>) -> Option<CheckResult> {
    if arch.is_native() {
        return None;
    }
    let prefix = resolve_compiler_prefix(arch.kernel_arch(), explicit_prefix);
    if prefix.is_empty() {
        return None;
    }
    let gcc = format!("{}gcc", prefix);
    let result = match which::which(&gcc) {
        Ok(path) => CheckResult::pass_with(&gcc, &path.display().to_string()),
        Err(_) => CheckResult::fail(&gcc, &format!("Cross compiler for {} not found", arch)),
    };
    Some(result)
}
