use std::sync::OnceLock;

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::error::{StoreError, StoreResult};

fn path_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/$|^(/[-.[:alnum:]]+)+$").ok())
        .as_ref()
}

/// Reject paths that are not absolute, slash separated, and made of
/// ASCII letters, digits, `.` and `-`.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path_regex().is_some_and(|re| re.is_match(path)) {
        Ok(())
    } else {
        Err(StoreError::BadPath(path.to_string()))
    }
}

/// Join path segments with `/`, collapsing duplicate separators.
pub fn join<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        for seg in part.as_ref().split('/').filter(|s| !s.is_empty()) {
            out.push('/');
            out.push_str(seg);
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Compile a coordinator glob: `*` stays within one path segment, `**`
/// spans any number of them.
pub fn compile_glob(pattern: &str) -> StoreResult<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| StoreError::BadPath(format!("{pattern} ({e})")))
}
