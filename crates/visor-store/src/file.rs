use crate::codec::Codec;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;

/// A decoded value at a path, pinned to the snapshot it was read from.
#[derive(Debug, Clone)]
pub struct File<C: Codec> {
    snapshot: Snapshot,
    path: String,
    pub value: C::Value,
    codec: C,
}

impl<C: Codec> File<C> {
    pub fn new(snapshot: Snapshot, path: &str, value: C::Value, codec: C) -> Self {
        Self {
            snapshot,
            path: path.to_string(),
            value,
            codec,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Write the current value, guarded on the file's snapshot.
    pub fn save(&self) -> StoreResult<Self> {
        self.set(self.value.clone())
    }

    pub fn set(&self, value: C::Value) -> StoreResult<Self> {
        let body = self.codec.encode(&value).map_err(|message| StoreError::Codec {
            path: self.path.clone(),
            message,
        })?;
        let snapshot = self.snapshot.set_bytes(&self.path, &body)?;
        Ok(Self {
            snapshot,
            path: self.path.clone(),
            value,
            codec: self.codec.clone(),
        })
    }

    pub fn del(&self) -> StoreResult<()> {
        self.snapshot.del(&self.path)
    }
}
