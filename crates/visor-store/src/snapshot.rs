use std::time::Duration;

use crate::codec::Codec;
use crate::conn::Conn;
use crate::error::{StoreError, StoreResult};
use crate::file::File;
use crate::tree::RawEvent;

/// A consistent view of the tree at one revision.
///
/// Reads happen at `rev`. Writes are guarded on `rev`, so they fail with
/// `RevMismatch` when the target changed after the snapshot was taken, and
/// return a snapshot positioned at the write.
#[derive(Debug, Clone)]
pub struct Snapshot {
    rev: i64,
    conn: Conn,
}

impl Snapshot {
    pub fn new(rev: i64, conn: Conn) -> Self {
        Self { rev, conn }
    }

    /// Snapshot at the coordinator's current revision.
    pub fn latest(conn: Conn) -> StoreResult<Self> {
        let rev = conn.rev()?;
        Ok(Self { rev, conn })
    }

    pub fn rev(&self) -> i64 {
        self.rev
    }

    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    pub fn fast_forward(&self) -> StoreResult<Self> {
        Snapshot::latest(self.conn.clone())
    }

    /// Move to `rev`, never backwards.
    pub fn fast_forward_to(&self, rev: i64) -> Self {
        Self {
            rev: rev.max(self.rev),
            conn: self.conn.clone(),
        }
    }

    pub fn exists(&self, path: &str) -> StoreResult<(bool, i64)> {
        self.conn.exists(path, Some(self.rev))
    }

    pub fn stat(&self, path: &str) -> StoreResult<(usize, i64)> {
        self.conn.stat(path, Some(self.rev))
    }

    pub fn get_bytes(&self, path: &str) -> StoreResult<(Vec<u8>, i64)> {
        match self.conn.get(path, Some(self.rev))? {
            (Some(body), rev) => Ok((body, rev)),
            (None, _) => Err(StoreError::NoEnt {
                path: path.to_string(),
                at: Some(self.rev),
            }),
        }
    }

    pub fn get(&self, path: &str) -> StoreResult<(String, i64)> {
        let (body, rev) = self.get_bytes(path)?;
        Ok((String::from_utf8_lossy(&body).into_owned(), rev))
    }

    pub fn get_file<C: Codec>(&self, path: &str, codec: C) -> StoreResult<File<C>> {
        let (body, _) = self.get_bytes(path)?;
        let value = codec.decode(&body).map_err(|message| StoreError::Codec {
            path: path.to_string(),
            message,
        })?;
        Ok(File::new(self.clone(), path, value, codec))
    }

    pub fn getdir(&self, path: &str) -> StoreResult<Vec<String>> {
        self.conn.getdir(path, Some(self.rev))
    }

    pub fn set_bytes(&self, path: &str, body: &[u8]) -> StoreResult<Self> {
        let rev = self.conn.set(path, self.rev, body)?;
        Ok(self.fast_forward_to(rev))
    }

    pub fn set(&self, path: &str, value: &str) -> StoreResult<Self> {
        self.set_bytes(path, value.as_bytes())
    }

    /// Write `value` only when `path` already exists.
    pub fn update(&self, path: &str, value: &str) -> StoreResult<Self> {
        let (exists, _) = self.exists(path)?;
        if !exists {
            return Err(StoreError::NoEnt {
                path: path.to_string(),
                at: Some(self.rev),
            });
        }
        self.set(path, value)
    }

    pub fn del(&self, path: &str) -> StoreResult<()> {
        self.conn.del(path, self.rev)
    }

    /// Wait for a change matching `glob` after this snapshot.
    pub fn wait(&self, glob: &str, timeout: Option<Duration>) -> StoreResult<Option<RawEvent>> {
        self.conn.wait(glob, self.rev + 1, timeout)
    }
}
