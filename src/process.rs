//! Centralized command execution with consistent error handling.
//!
//! Every external tool runs through [`Cmd`]. The child's stdout and stderr are
//! streamed line by line into a [`LogSink`] while it runs, and an optional
//! deadline kills the child's whole process group when exceeded.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};

use crate::error::BuildError;
use crate::logging::{LogSink, Stream};

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    /// Human name of the build step, used in errors.
    step: Option<String>,
    timeout: Option<Duration>,
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut(Duration),
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            step: None,
            timeout: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child (on top of the inherited environment).
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Name the build step this command performs.
    pub fn step(mut self, step: impl AsRef<str>) -> Self {
        self.step = Some(step.as_ref().to_string());
        self
    }

    /// Kill the command (and everything it spawned) after `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Look up an environment variable set on this command.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Program and arguments joined for log output.
    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command to completion, streaming its output into `sink`.
    ///
    /// Non-zero exit becomes [`BuildError::CommandFailed`], an expired
    /// deadline becomes [`BuildError::CommandTimedOut`].
    pub fn run_logged(self, sink: &dyn LogSink) -> Result<()> {
        let step = self
            .step
            .clone()
            .unwrap_or_else(|| format!("'{}'", self.program));
        tracing::debug!(command = %self.describe(), "running");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start process runtime")?;

        match runtime.block_on(self.stream(sink))? {
            Outcome::Exited(status) if status.success() => Ok(()),
            Outcome::Exited(status) => Err(BuildError::CommandFailed {
                step,
                program: self.program,
                code: status.code(),
            }
            .into()),
            Outcome::TimedOut(timeout) => Err(BuildError::CommandTimedOut {
                step,
                program: self.program,
                timeout,
            }
            .into()),
        }
    }

    async fn stream(&self, sink: &dyn LogSink) -> Result<Outcome> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;
        let pid = child.id();
        let stdout = child.stdout.take().context("child stdout was not captured")?;
        let stderr = child.stderr.take().context("child stderr was not captured")?;

        let Some(limit) = self.timeout else {
            let status = pump(&self.program, &mut child, stdout, stderr, sink).await?;
            return Ok(Outcome::Exited(status));
        };

        let waited = tokio::time::timeout(
            limit,
            pump(&self.program, &mut child, stdout, stderr, sink),
        )
        .await;

        match waited {
            Ok(status) => Ok(Outcome::Exited(status?)),
            Err(_) => {
                tracing::warn!(program = %self.program, "deadline of {}s exceeded, killing process group", limit.as_secs());
                kill_process_group(pid);
                let _ = child.kill().await;
                Ok(Outcome::TimedOut(limit))
            }
        }
    }
}

/// Forward both pipes into the sink until they close, then reap the child.
async fn pump(
    program: &str,
    child: &mut Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    sink: &dyn LogSink,
) -> std::io::Result<ExitStatus> {
    let mut out = BufReader::new(stdout).split(b'\n');
    let mut err = BufReader::new(stderr).split(b'\n');
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            segment = out.next_segment(), if out_open => match segment? {
                Some(bytes) => sink.line(program, Stream::Stdout, &decode_line(&bytes)),
                None => out_open = false,
            },
            segment = err.next_segment(), if err_open => match segment? {
                Some(bytes) => sink.line(program, Stream::Stderr, &decode_line(&bytes)),
                None => err_open = false,
            },
        }
    }

    child.wait().await
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.trim_end_matches('\r').to_string()
}

fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // The child was spawned with process_group(0), so its pid is the pgid.
    // SAFETY: killpg only sends a signal; an already-gone group yields ESRCH.
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}
