//! Preflight checks for a rootfs build.
//!
//! Validates host tools, inputs and the workspace before starting a build.
//! Run with `rootfs-builder preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks. `cross_prefix` is the toolbox config's explicit prefix, if any.
pub fn run_preflight(config: &Config, cross_prefix: Option<&str>) -> PreflightReport {
    let mut checks = Vec::new();

    tracing::info!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(&config.tools));
    checks.extend(host_tools::check_cross_compiler(config.arch, cross_prefix));

    tracing::info!("Checking build environment...");
    checks.extend(environment::check_build_environment(config));

    if let Some(qemu) = config.arch.qemu_user_binary() {
        if which::which(qemu).is_err() {
            checks.push(CheckResult::warn(
                qemu,
                "Not found - target binaries cannot be run on this host",
            ));
        } else {
            checks.push(CheckResult::pass(qemu));
        }
    }

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config, cross_prefix: Option<&str>) -> Result<()> {
    let report = run_preflight(config, cross_prefix);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
