//! Build environment checks (workspace, inputs, repository config).

use std::fs;
use std::path::Path;

use crate::config::Config;

use super::types::CheckResult;

pub fn check_build_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![check_writable(&config.workspace)];

    for (name, path) in [
        ("FHS layout", &config.fhs_layout),
        ("Toolbox config", &config.toolbox_config),
        ("pacman.conf", &config.repo.pacman_conf),
    ] {
        if path.is_file() {
            results.push(CheckResult::pass_with(name, &path.display().to_string()));
        } else {
            results.push(CheckResult::fail(
                name,
                &format!("{} not found", path.display()),
            ));
        }
    }

    for (name, path) in [
        ("pacman.d", &config.repo.pacman_d),
        ("pacman keyrings", &config.repo.pacman_share),
    ] {
        if path.is_dir() {
            results.push(CheckResult::pass(name));
        } else {
            results.push(CheckResult::warn(
                name,
                &format!("{} not found, will not be copied", path.display()),
            ));
        }
    }

    results
}

/// The workspace root can be created and written to.
fn check_writable(workspace: &Path) -> CheckResult {
    const NAME: &str = "workspace writable";

    if let Err(e) = fs::create_dir_all(workspace) {
        return CheckResult::fail(NAME, &format!("Cannot create {}: {}", workspace.display(), e));
    }
    let marker = workspace.join(".preflight-test");
    match fs::write(&marker, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            CheckResult::pass_with(NAME, &workspace.display().to_string())
        }
        Err(e) => CheckResult::fail(NAME, &format!("Cannot write to {}: {}", workspace.display(), e)),
    }
}
