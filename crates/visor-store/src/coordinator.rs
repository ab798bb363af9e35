use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;
use visor_util::fs::expand_home;

use crate::disk::DiskCoordinator;
use crate::error::{StoreError, StoreResult};
use crate::mem::MemCoordinator;
use crate::tree::RawEvent;

/// A hierarchical, revisioned key/value tree.
///
/// Every mutation bumps a global revision. Reads take an optional revision
/// and answer as of that point; `None` reads the latest state.
pub trait Coordinator: Send + Sync + Debug {
    /// Current global revision.
    fn rev(&self) -> StoreResult<i64>;

    /// Body and revision of the file at `path`. A missing file yields
    /// `(None, 0)`.
    fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(Option<Vec<u8>>, i64)>;

    /// Write `body` unless the file changed after `guard`. Returns the new
    /// global revision.
    fn set(&self, path: &str, guard: i64, body: &[u8]) -> StoreResult<i64>;

    fn del(&self, path: &str, guard: i64) -> StoreResult<()>;

    /// `(length, revision)` for files, `(children, -2)` for directories and
    /// `(0, 0)` for missing paths.
    fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<(usize, i64)>;

    /// Sorted names of the children of `path`.
    fn getdir(&self, path: &str, rev: Option<i64>) -> StoreResult<Vec<String>>;

    /// Block until a change at or after `from_rev` matches `glob`, or the
    /// timeout elapses.
    fn wait(
        &self,
        glob: &str,
        from_rev: i64,
        timeout: Option<Duration>,
    ) -> StoreResult<Option<RawEvent>>;
}

/// Open a coordinator from a URI.
///
/// * `mem:` creates a fresh in-process tree.
/// * `file:<path>` and `file:///abs/path` open (or create) a JSON-backed
///   tree on disk. A leading `~/` is expanded.
pub fn dial(uri: &str) -> StoreResult<Arc<dyn Coordinator>> {
    let (scheme, rest) = uri
        .split_once(':')
        .ok_or_else(|| StoreError::BadUri(uri.to_string()))?;

    match scheme {
        "mem" => Ok(Arc::new(MemCoordinator::new())),
        "file" => {
            let path = file_uri_path(uri, rest)?;
            tracing::debug!("dialing disk coordinator at {}", path.display());
            Ok(Arc::new(DiskCoordinator::open(path)?))
        }
        _ => Err(StoreError::BadUri(uri.to_string())),
    }
}

fn file_uri_path(uri: &str, rest: &str) -> StoreResult<PathBuf> {
    if rest.starts_with("//") {
        let url = Url::parse(uri).map_err(|_| StoreError::BadUri(uri.to_string()))?;
        return url
            .to_file_path()
            .map_err(|_| StoreError::BadUri(uri.to_string()));
    }
    if rest.is_empty() {
        return Err(StoreError::BadUri(uri.to_string()));
    }
    Ok(expand_home(rest))
}
