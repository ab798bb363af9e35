use miette::Diagnostic;
use thiserror::Error;
use visor_store::StoreError;

/// Errors raised by registry operations.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("{0}")]
    Conflict(String),

    /// A guarded write raced with another writer.
    #[error("{0}")]
    RevMismatch(String),

    #[error("instance {0} is already claimed")]
    InsClaimed(i64),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid name \"{0}\"")]
    #[diagnostic(help("names may contain ASCII letters, digits and '-'"))]
    BadName(String),

    #[error("invalid proc name \"{0}\"")]
    #[diagnostic(help("proc names may only contain ASCII letters and digits"))]
    BadProcName(String),

    #[error("{0}")]
    InvalidKey(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("schema mismatch: client is at version {expected}, coordinator at {}", .found.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string()))]
    #[diagnostic(help("run `visor init` against a fresh root or upgrade the client"))]
    SchemaMismatch { expected: i64, found: Option<i64> },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("runner {addr}: {message}")]
    Runner { addr: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(StoreError),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::Conflict(_))
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoEnt { .. } => RegistryError::NotFound(err.to_string()),
            StoreError::RevMismatch { .. } => RegistryError::RevMismatch(err.to_string()),
            other => RegistryError::Store(other),
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
