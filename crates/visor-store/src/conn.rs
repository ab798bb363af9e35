use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{dial, Coordinator};
use crate::error::{StoreError, StoreResult};
use crate::path::join;
use crate::tree::RawEvent;
use crate::{DIR_REV, MISSING};

pub const DEFAULT_ROOT: &str = "/visor";

/// A coordinator handle scoped to a root directory.
///
/// All paths handed to a `Conn` are relative to the root, and paths of
/// events coming back from `wait` have the root stripped again.
#[derive(Debug, Clone)]
pub struct Conn {
    root: String,
    coord: Arc<dyn Coordinator>,
}

impl Conn {
    pub fn new(coord: Arc<dyn Coordinator>, root: &str) -> Self {
        Self {
            root: join([root]),
            coord,
        }
    }

    pub fn dial(uri: &str, root: &str) -> StoreResult<Self> {
        Ok(Self::new(dial(uri)?, root))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn coordinator(&self) -> &Arc<dyn Coordinator> {
        &self.coord
    }

    fn prefix(&self, path: &str) -> String {
        join([self.root.as_str(), path])
    }

    fn strip(&self, path: &str) -> String {
        if self.root == "/" {
            return path.to_string();
        }
        match path.strip_prefix(&self.root) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }

    pub fn rev(&self) -> StoreResult<i64> {
        self.coord.rev()
    }

    pub fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(Option<Vec<u8>>, i64)> {
        self.coord.get(&self.prefix(path), rev)
    }

    pub fn set(&self, path: &str, guard: i64, body: &[u8]) -> StoreResult<i64> {
        let full = self.prefix(path);
        tracing::debug!(path = %full, guard, "set");
        self.coord.set(&full, guard, body)
    }

    pub fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<(usize, i64)> {
        self.coord.stat(&self.prefix(path), rev)
    }

    /// Whether a file or directory exists at `path`, with the file revision
    /// (`-2` for directories).
    pub fn exists(&self, path: &str, rev: Option<i64>) -> StoreResult<(bool, i64)> {
        let (_, file_rev) = self.stat(path, rev)?;
        Ok((file_rev != MISSING, file_rev))
    }

    pub fn getdir(&self, path: &str, rev: Option<i64>) -> StoreResult<Vec<String>> {
        self.coord.getdir(&self.prefix(path), rev)
    }

    /// Delete a file, or every file below a directory, guarded on `rev`.
    pub fn del(&self, path: &str, rev: i64) -> StoreResult<()> {
        let (_, file_rev) = self.stat(path, Some(rev))?;
        match file_rev {
            MISSING => Err(StoreError::NoEnt {
                path: self.prefix(path),
                at: Some(rev),
            }),
            DIR_REV => {
                for child in self.getdir(path, Some(rev))? {
                    self.del(&join([path, child.as_str()]), rev)?;
                }
                Ok(())
            }
            _ => {
                let full = self.prefix(path);
                tracing::debug!(path = %full, rev, "del");
                self.coord.del(&full, rev)
            }
        }
    }

    pub fn wait(
        &self,
        glob: &str,
        from_rev: i64,
        timeout: Option<Duration>,
    ) -> StoreResult<Option<RawEvent>> {
        let event = self.coord.wait(&self.prefix(glob), from_rev, timeout)?;
        Ok(event.map(|mut e| {
            e.path = self.strip(&e.path);
            e
        }))
    }
}
