use std::time::Duration;

use visor_store::{IntCodec, Snapshot, StoreError};

use crate::error::{RegistryError, RegistryResult};

pub const SCHEMA_PATH: &str = "/internal/schema";

/// Layout version this client reads and writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Record `version` as the coordinator's schema version.
pub fn set_schema_version(sp: &Snapshot, version: i64) -> RegistryResult<Snapshot> {
    let sp = sp.fast_forward()?;
    Ok(sp.set(SCHEMA_PATH, &version.to_string())?)
}

/// The coordinator's schema version, if one was ever written.
pub fn get_schema_version(sp: &Snapshot) -> RegistryResult<Option<i64>> {
    match sp.fast_forward()?.get_file(SCHEMA_PATH, IntCodec) {
        Ok(f) => Ok(Some(f.value)),
        Err(StoreError::NoEnt { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fails with `SchemaMismatch` unless the coordinator is at `expected`.
pub fn verify_schema_version(sp: &Snapshot, expected: i64) -> RegistryResult<()> {
    match get_schema_version(sp)? {
        Some(found) if found == expected => Ok(()),
        found => Err(RegistryError::SchemaMismatch { expected, found }),
    }
}

/// Blocking iterator over schema version changes after `sp`.
pub fn watch_schema(sp: &Snapshot) -> SchemaWatch {
    SchemaWatch {
        snapshot: sp.clone(),
        rev: sp.rev(),
        timeout: None,
    }
}

#[derive(Debug)]
pub struct SchemaWatch {
    snapshot: Snapshot,
    rev: i64,
    timeout: Option<Duration>,
}

impl SchemaWatch {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Iterator for SchemaWatch {
    type Item = RegistryResult<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.snapshot.conn().wait(SCHEMA_PATH, self.rev + 1, self.timeout) {
                Ok(Some(event)) => event,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.rev = event.rev;
            if !event.is_set() {
                continue;
            }
            let body = event.body_str();
            return Some(body.trim().parse().map_err(|_| {
                RegistryError::InvalidState(format!("bad schema version \"{}\"", body.trim()))
            }));
        }
    }
}
