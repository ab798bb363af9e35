use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A formula file could not be loaded.
#[derive(Debug, Error, Diagnostic)]
pub enum FormulaError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(help("see Formula.toml in the repository root for the expected layout"))]
    Parse { path: PathBuf, message: String },
}

/// Install, smoke test and verification failures.
///
/// Each install failure class has its own process exit status, see
/// [`InstallError::exit_code`].
#[derive(Debug, Error, Diagnostic)]
pub enum InstallError {
    #[error("build command `{command}` failed with {}", .code.map(|c| format!("exit code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    BuildFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("required build tool `{tool}` was not found on PATH")]
    #[diagnostic(help("install `{tool}` and make sure it is on PATH"))]
    MissingDependency { tool: String },

    #[error("version control tool `{vcs}` is not installed")]
    #[diagnostic(help("run `{host} install {vcs}` and retry"))]
    MissingVcs { vcs: String, host: String },

    #[error("`{vcs} --version` failed: {detail}")]
    #[diagnostic(help("reinstall `{vcs}`; the current installation is broken"))]
    BrokenVcs { vcs: String, detail: String },

    #[error("`{host}` is at {found}, at least {required} is required")]
    #[diagnostic(help("run `{host} update` and retry"))]
    OutdatedHost {
        host: String,
        found: String,
        required: String,
    },

    #[error("smoke test `{command}` failed: {message}")]
    SmokeTest { command: String, message: String },

    #[error("formula has no sha256 to verify against")]
    NoChecksum,

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{message}")]
    Process { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::BuildFailed { .. } => 1,
            InstallError::MissingDependency { .. } => 2,
            InstallError::MissingVcs { .. } => 3,
            InstallError::BrokenVcs { .. } => 4,
            InstallError::OutdatedHost { .. } => 5,
            InstallError::SmokeTest { .. } => 6,
            InstallError::NoChecksum | InstallError::ChecksumMismatch { .. } => 7,
            InstallError::Process { .. } | InstallError::Io(_) => 1,
        }
    }
}

impl From<visor_util::errors::VisorError> for InstallError {
    fn from(err: visor_util::errors::VisorError) -> Self {
        InstallError::Process {
            message: err.to_string(),
        }
    }
}
