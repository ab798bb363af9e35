use rayon::prelude::*;

use crate::codec::Codec;
use crate::error::StoreResult;
use crate::file::File;
use crate::path::join;
use crate::snapshot::Snapshot;

/// A directory in the tree, viewed through a snapshot.
#[derive(Debug, Clone)]
pub struct Dir {
    pub snapshot: Snapshot,
    name: String,
}

impl Dir {
    pub fn new(snapshot: Snapshot, name: &str) -> Self {
        Self {
            snapshot,
            name: join([name]),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of `parts` below this directory.
    pub fn prefix<S: AsRef<str>>(&self, parts: &[S]) -> String {
        join(std::iter::once(self.name.as_str()).chain(parts.iter().map(AsRef::as_ref)))
    }

    /// The same directory at another snapshot.
    pub fn join(&self, snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            name: self.name.clone(),
        }
    }

    pub fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.snapshot.exists(&self.prefix(&[key]))?.0)
    }

    pub fn get(&self, key: &str) -> StoreResult<String> {
        Ok(self.snapshot.get(&self.prefix(&[key]))?.0)
    }

    pub fn get_file<C: Codec>(&self, key: &str, codec: C) -> StoreResult<File<C>> {
        self.snapshot.get_file(&self.prefix(&[key]), codec)
    }

    pub fn getdir(&self, key: &str) -> StoreResult<Vec<String>> {
        self.snapshot.getdir(&self.prefix(&[key]))
    }

    /// Write `value` under `key` and return the directory at the new
    /// revision.
    pub fn set(&self, key: &str, value: &str) -> StoreResult<Self> {
        let snapshot = self.snapshot.set(&self.prefix(&[key]), value)?;
        Ok(self.join(snapshot))
    }

    pub fn set_bytes(&self, key: &str, body: &[u8]) -> StoreResult<Self> {
        let snapshot = self.snapshot.set_bytes(&self.prefix(&[key]), body)?;
        Ok(self.join(snapshot))
    }

    /// Encode `value` with `codec` and write it under `key`.
    pub fn set_file<C: Codec>(&self, key: &str, value: &C::Value, codec: C) -> StoreResult<Self> {
        let body = codec
            .encode(value)
            .map_err(|message| crate::error::StoreError::Codec {
                path: self.prefix(&[key]),
                message,
            })?;
        self.set_bytes(key, &body)
    }

    /// Delete `key`, or the whole directory when `key` is `/`.
    pub fn del(&self, key: &str) -> StoreResult<()> {
        self.snapshot.del(&self.prefix(&[key]))
    }

    pub fn fast_forward(&self) -> StoreResult<Self> {
        Ok(self.join(self.snapshot.fast_forward()?))
    }
}

/// Resolve every name with `f` on the rayon pool, preserving order.
///
/// Returns the first error encountered.
pub fn get_snapshotables<T, E, F>(names: &[String], f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(&str) -> Result<T, E> + Sync + Send,
{
    names.par_iter().map(|name| f(name)).collect()
}
