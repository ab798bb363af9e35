use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for visor front-ends.
///
/// Library crates carry their own error enums; this type covers the
/// concerns shared by all of them and is what the CLI reports.
#[derive(Debug, Error, Diagnostic)]
pub enum VisorError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration (e.g. ~/.visor/config.toml).
    #[error("Config error: {message}")]
    #[diagnostic(help("Check ~/.visor/config.toml for syntax errors"))]
    Config { message: String },

    /// An external process could not be spawned or failed.
    #[error("Process error: {message}")]
    Process { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}
