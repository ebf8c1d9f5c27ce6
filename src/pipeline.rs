//! Runs the build stages in order against one workspace.
//!
//! All inputs are loaded before the first stage touches the rootfs, so a
//! broken layout or toolbox config fails the run without side effects. A
//! stage failure stops the run; whatever earlier stages wrote stays on disk.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;

use crate::config::Config;
use crate::context::BuildContext;
use crate::fhs::{FhsLayout, FhsRootBuilder};
use crate::logging::LogSink;
use crate::packages::{InstallSummary, PackageInstaller};
use crate::timing::Timer;
use crate::toolbox::{SymlinkOutcome, ToolboxBuildConfig, ToolboxBuilder};
use crate::workspace::WorkspacePaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Fhs,
    Toolbox,
    Packages,
}

impl Stage {
    /// Execution order.
    pub const ALL: [Stage; 3] = [Stage::Fhs, Stage::Toolbox, Stage::Packages];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fhs => "FHS skeleton",
            Stage::Toolbox => "BusyBox toolbox",
            Stage::Packages => "package install",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub rootfs: PathBuf,
    pub completed: Vec<Stage>,
    pub toolbox: Option<SymlinkOutcome>,
    pub packages: Option<InstallSummary>,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    stages: Vec<Stage>,
    clean: bool,
}

/// Inputs loaded up front.
struct Inputs {
    layout: Option<FhsLayout>,
    toolbox: Option<ToolboxBuilder>,
    packages: Option<PackageInstaller>,
}

impl<'a> Pipeline<'a> {
    /// All stages, no clean.
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            stages: Stage::ALL.to_vec(),
            clean: false,
        }
    }

    /// Restrict the run to `stages`; they still execute in pipeline order.
    pub fn only(mut self, stages: &[Stage]) -> Self {
        self.stages = Stage::ALL
            .into_iter()
            .filter(|s| stages.contains(s))
            .collect();
        self
    }

    /// Empty this architecture's rootfs before the first stage.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn run(&self, paths: &WorkspacePaths, sink: &dyn LogSink) -> Result<PipelineReport> {
        let config = self.config;
        let inputs = self.load_inputs()?;

        if self.clean {
            paths.clean_arch_rootfs(config.arch)?;
        }

        let ctx = BuildContext::new(paths, config.arch, &config.tools, sink)
            .with_timeout(config.command_timeout);
        let rootfs = ctx.rootfs();
        std::fs::create_dir_all(&rootfs)
            .with_context(|| format!("Failed to create {}", rootfs.display()))?;

        tracing::info!(
            "Building {} rootfs in {} ({})",
            config.arch,
            rootfs.display(),
            self.stages
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let total = Timer::start("rootfs build");

        let mut report = PipelineReport {
            rootfs: rootfs.clone(),
            completed: Vec::new(),
            toolbox: None,
            packages: None,
        };

        for &stage in &self.stages {
            let timer = Timer::start(stage.name());
            let outcome = match stage {
                Stage::Fhs => {
                    if let Some(layout) = &inputs.layout {
                        FhsRootBuilder::new(layout, &rootfs).build()
                    } else {
                        Ok(())
                    }
                }
                Stage::Toolbox => inputs
                    .toolbox
                    .as_ref()
                    .map(|t| t.build(&ctx))
                    .transpose()
                    .map(|outcome| report.toolbox = outcome),
                Stage::Packages => inputs
                    .packages
                    .as_ref()
                    .map(|p| p.install(&ctx))
                    .transpose()
                    .map(|summary| report.packages = summary),
            };
            outcome.with_context(|| format!("Stage '{}' failed", stage))?;
            timer.finish();
            report.completed.push(stage);
        }

        total.finish();
        tracing::info!("Rootfs ready at {}", rootfs.display());
        Ok(report)
    }

    fn load_inputs(&self) -> Result<Inputs> {
        let config = self.config;
        let wants = |stage| self.stages.contains(&stage);

        let layout = if wants(Stage::Fhs) {
            Some(FhsLayout::load(&config.fhs_layout).context("Failed to load FHS layout")?)
        } else {
            None
        };

        let toolbox = if wants(Stage::Toolbox) {
            let toolbox_config = ToolboxBuildConfig::load(&config.toolbox_config)
                .context("Failed to load toolbox config")?;
            Some(ToolboxBuilder::new(toolbox_config))
        } else {
            None
        };

        let packages = wants(Stage::Packages).then(|| {
            PackageInstaller::new(&config.packages)
                .with_sources(config.repo.clone())
                .with_sync_db(config.sync_db)
        });

        Ok(Inputs {
            layout,
            toolbox,
            packages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::logging::MemorySink;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_only_keeps_pipeline_order() {
        let config = Config::from_map(std::path::Path::new("/w"), &HashMap::new()).unwrap();
        let pipeline = Pipeline::new(&config).only(&[Stage::Packages, Stage::Fhs]);
        assert_eq!(pipeline.stages(), [Stage::Fhs, Stage::Packages]);
    }

    #[test]
    fn test_fhs_only_run() {
        let temp = TempDir::new().unwrap();
        let layout = temp.path().join("fhs.yaml");
        fs::write(
            &layout,
            "fhs:\n  directories: [/etc, /usr/bin]\n  symlinks:\n    - link: /bin\n      target: usr/bin\n",
        )
        .unwrap();

        let mut config = Config::from_map(temp.path(), &HashMap::new()).unwrap();
        config.fhs_layout = layout;
        let paths = WorkspacePaths::new(temp.path()).unwrap();
        let sink = MemorySink::new();

        let report = Pipeline::new(&config)
            .only(&[Stage::Fhs])
            .run(&paths, &sink)
            .unwrap();

        assert_eq!(report.completed, vec![Stage::Fhs]);
        assert!(report.rootfs.join("usr/bin").is_dir());
        assert!(report.rootfs.join("bin").is_symlink());
        assert!(report.toolbox.is_none());
    }

    #[test]
    fn test_bad_toolbox_config_fails_before_any_stage() {
        let temp = TempDir::new().unwrap();
        let layout = temp.path().join("fhs.yaml");
        fs::write(&layout, "fhs:\n  directories: [/etc]\n").unwrap();
        let toolbox = temp.path().join("busybox.json");
        fs::write(&toolbox, r#"{"version": "1.36.1", "urls": []}"#).unwrap();

        let mut config = Config::from_map(temp.path(), &HashMap::new()).unwrap();
        config.fhs_layout = layout;
        config.toolbox_config = toolbox;
        let paths = WorkspacePaths::new(temp.path()).unwrap();

        let err = Pipeline::new(&config)
            .run(&paths, &MemorySink::new())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ConfigSchema { .. })
        ));
        assert!(!paths.arch_rootfs(config.arch).join("etc").exists());
    }
}
