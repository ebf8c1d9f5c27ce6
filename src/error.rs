//! Error kinds callers need to tell apart.
//!
//! Everything else flows through `anyhow`; these variants are raised where a
//! caller (or a test) has to react to the specific failure, and are recovered
//! with `err.downcast_ref::<BuildError>()`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A configuration or layout file does not exist.
    #[error("configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// A required key is missing or a value has the wrong shape.
    #[error("invalid configuration in {}: {message}", path.display())]
    ConfigSchema { path: PathBuf, message: String },

    /// The file extension does not map to a known document format.
    #[error("unsupported configuration format '{extension}' for {} (expected .json, .yaml or .yml)", path.display())]
    UnsupportedInputType { path: PathBuf, extension: String },

    /// An external tool exited non-zero or was killed by a signal.
    #[error("{step} failed: '{program}' exited with {}", describe_code(*code))]
    CommandFailed {
        step: String,
        program: String,
        code: Option<i32>,
    },

    /// An external tool ran past its deadline and its process group was killed.
    #[error("{step} timed out: '{program}' killed after {}s", timeout.as_secs())]
    CommandTimedOut {
        step: String,
        program: String,
        timeout: Duration,
    },

    /// Every configured mirror failed to deliver a file.
    #[error("could not fetch {file}: all {attempts} mirror(s) failed")]
    MirrorsExhausted { file: String, attempts: usize },

    /// A downloaded file does not hash to the configured value.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A step that should have produced a file did not.
    #[error("missing {what}: {}", path.display())]
    MissingArtifact { what: String, path: PathBuf },
}

impl BuildError {
    /// True for failures of an invoked external tool (exit status or timeout).
    pub fn is_command_failure(&self) -> bool {
        matches!(
            self,
            BuildError::CommandFailed { .. } | BuildError::CommandTimedOut { .. }
        )
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}
