//! Build context shared across all stages.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::arch::Arch;
use crate::logging::LogSink;
use crate::process::Cmd;
use crate::tools::HostTools;
use crate::workspace::WorkspacePaths;

/// Everything a stage needs besides its own configuration.
pub struct BuildContext<'a> {
    pub paths: &'a WorkspacePaths,
    pub arch: Arch,
    pub tools: &'a HostTools,
    /// Receives the output of every external tool.
    pub sink: &'a dyn LogSink,
    /// Per-command deadline; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        paths: &'a WorkspacePaths,
        arch: Arch,
        tools: &'a HostTools,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            paths,
            arch,
            tools,
            sink,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The rootfs tree this build writes into.
    pub fn rootfs(&self) -> PathBuf {
        self.paths.arch_rootfs(self.arch)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.paths.arch_build_dir(self.arch)
    }

    pub fn pacman_cache(&self) -> PathBuf {
        self.paths.arch_pacman_cache(self.arch)
    }

    /// Run a command with this context's deadline and sink.
    pub fn run(&self, cmd: Cmd) -> Result<()> {
        cmd.timeout(self.timeout).run_logged(self.sink)
    }
}
