use std::path::Path;

use visor_util::hash::sha256_file;

use crate::error::InstallError;
use crate::formula::Formula;

/// Check a downloaded archive against the formula's `sha256`.
///
/// Returns the digest on success.
pub fn verify_archive(formula: &Formula, path: &Path) -> Result<String, InstallError> {
    let expected = formula.sha256.as_deref().ok_or(InstallError::NoChecksum)?;
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        tracing::debug!(path = %path.display(), "archive checksum ok");
        Ok(actual)
    } else {
        Err(InstallError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}
