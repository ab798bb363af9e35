use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the coordinator layer.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// The path has no live file (or directory) at the requested revision.
    #[error("path \"{path}\" not found at {}", .at.map(|r| r.to_string()).unwrap_or_else(|| "latest revision".to_string()))]
    NoEnt { path: String, at: Option<i64> },

    /// A guarded write lost the race: the file changed after `guard`.
    #[error("revision mismatch on \"{path}\": file is at {current}, write guarded on {guard}")]
    RevMismatch {
        path: String,
        current: i64,
        guard: i64,
    },

    #[error("invalid path \"{0}\": only ASCII letters, numbers, '.', or '-' are allowed")]
    BadPath(String),

    #[error("\"{0}\" is a directory")]
    IsDir(String),

    /// Reads below the compaction floor cannot be answered.
    #[error("revision {rev} is older than the retained history (floor {floor})")]
    RevTooOld { rev: i64, floor: i64 },

    #[error("cannot decode \"{path}\": {message}")]
    Codec { path: String, message: String },

    #[error("unsupported coordinator uri \"{0}\"")]
    #[diagnostic(help("use mem: or file:<path>"))]
    BadUri(String),

    #[error("coordinator state is corrupt: {0}")]
    Corrupt(String),

    #[error("timed out acquiring lock {0}")]
    #[diagnostic(help("remove the lock file if no other visor process is running"))]
    LockTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_no_ent(&self) -> bool {
        matches!(self, StoreError::NoEnt { .. })
    }

    pub fn is_rev_mismatch(&self) -> bool {
        matches!(self, StoreError::RevMismatch { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
