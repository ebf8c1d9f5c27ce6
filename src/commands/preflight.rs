//! Preflight command - runs preflight checks.

use anyhow::Result;

use crate::config::Config;
use crate::preflight;
use crate::toolbox::ToolboxBuildConfig;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    // A missing toolbox config is reported by the environment checks.
    let explicit_prefix = ToolboxBuildConfig::load(&config.toolbox_config)
        .ok()
        .and_then(|c| c.cross_compile.compiler_prefix);

    if strict {
        preflight::run_preflight_or_fail(config, explicit_prefix.as_deref())?;
    } else {
        let report = preflight::run_preflight(config, explicit_prefix.as_deref());
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail with a non-zero exit code.");
        }
    }
    Ok(())
}
