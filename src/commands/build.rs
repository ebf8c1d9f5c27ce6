//! Build command - assembles the rootfs.

use anyhow::Result;
use std::path::PathBuf;

use crate::arch::Arch;
use crate::config::Config;
use crate::logging::TracingSink;
use crate::packages::dedup_packages;
use crate::pipeline::{Pipeline, Stage};
use crate::workspace::WorkspacePaths;

/// Build target for the build command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// Every stage in order
    Full,
    /// One stage only
    Stage(Stage),
}

/// Command-line overrides on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub arch: Option<Arch>,
    pub clean: bool,
    pub fhs_layout: Option<PathBuf>,
    pub toolbox_config: Option<PathBuf>,
    pub packages: Option<Vec<String>>,
}

impl BuildOverrides {
    pub fn apply(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(arch) = self.arch {
            config.arch = arch;
        }
        if let Some(path) = &self.fhs_layout {
            config.fhs_layout = path.clone();
        }
        if let Some(path) = &self.toolbox_config {
            config.toolbox_config = path.clone();
        }
        if let Some(packages) = &self.packages {
            config.packages = dedup_packages(packages);
        }
        config
    }
}

/// Execute the build command.
pub fn cmd_build(
    paths: &WorkspacePaths,
    target: BuildTarget,
    config: &Config,
    overrides: &BuildOverrides,
) -> Result<()> {
    let config = overrides.apply(config);
    let mut pipeline = Pipeline::new(&config).clean(overrides.clean);
    if let BuildTarget::Stage(stage) = target {
        pipeline = pipeline.only(&[stage]);
    }

    let report = pipeline.run(paths, &TracingSink)?;

    println!("\n=== Build Complete ===");
    println!("  Rootfs: {}", report.rootfs.display());
    for stage in &report.completed {
        println!("  [done] {}", stage);
    }
    if let Some(summary) = &report.packages {
        println!(
            "  Packages: {} requested, {} archive(s) extracted",
            summary.requested, summary.extracted
        );
    }
    println!("  Log: {}", paths.build_log().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn test_overrides_replace_config_values() {
        let config = Config::from_map(Path::new("/w"), &HashMap::new()).unwrap();
        let overrides = BuildOverrides {
            arch: Some(Arch::Arm64),
            packages: Some(vec!["bash".into(), "bash".into(), "vim".into()]),
            toolbox_config: Some(PathBuf::from("/tmp/bb.yaml")),
            ..BuildOverrides::default()
        };

        let applied = overrides.apply(&config);
        assert_eq!(applied.arch, Arch::Arm64);
        assert_eq!(applied.packages, vec!["bash", "vim"]);
        assert_eq!(applied.toolbox_config, PathBuf::from("/tmp/bb.yaml"));
        assert_eq!(applied.fhs_layout, config.fhs_layout);
    }
}
