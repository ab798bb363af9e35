use std::thread;
use std::time::Duration;

use visor_store::{Conn, IntCodec, Snapshot, StoreError, CLOBBER};

use crate::error::{RegistryError, RegistryResult};
use crate::schema::{SCHEMA_PATH, SCHEMA_VERSION};
use crate::time::timestamp;

pub const NEXT_PORT_PATH: &str = "/next-port";
pub const UID_PATH: &str = "/uid";
pub const PROXIES_PATH: &str = "/proxies";
pub const PMS_PATH: &str = "/pms";

/// First port handed out by `claim_next_port` on a fresh registry.
pub const START_PORT: i64 = 8000;

const PORT_RETRY: Duration = Duration::from_millis(100);

/// Entry point to the registry.
///
/// A `Store` is a snapshot of the coordinator. Registry objects created
/// through it carry their own snapshot and move forward independently.
#[derive(Debug, Clone)]
pub struct Store {
    snapshot: Snapshot,
}

impl Store {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Connect to the coordinator at `uri`, scoped to `root`.
    pub fn dial(uri: &str, root: &str) -> RegistryResult<Self> {
        let conn = Conn::dial(uri, root)?;
        Ok(Self::new(Snapshot::latest(conn)?))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn rev(&self) -> i64 {
        self.snapshot.rev()
    }

    pub fn fast_forward(&self) -> RegistryResult<Self> {
        Ok(Self::new(self.snapshot.fast_forward()?))
    }

    /// Seed the port counter and schema version on a fresh registry.
    pub fn init(&self) -> RegistryResult<Self> {
        let mut sp = self.snapshot.fast_forward()?;
        if !sp.exists(NEXT_PORT_PATH)?.0 {
            sp = sp.set(NEXT_PORT_PATH, &START_PORT.to_string())?;
        }
        if !sp.exists(SCHEMA_PATH)?.0 {
            sp = sp.set(SCHEMA_PATH, &SCHEMA_VERSION.to_string())?;
        }
        tracing::debug!(rev = sp.rev(), "registry initialized");
        Ok(Self::new(sp))
    }

    /// Delete everything below the root.
    pub fn reset(&self) -> RegistryResult<Self> {
        let sp = self.snapshot.fast_forward()?;
        match sp.del("/") {
            Ok(()) | Err(StoreError::NoEnt { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.fast_forward()
    }

    /// A registry-wide unique id: the revision of a write to `/uid`.
    pub fn getuid(&self) -> RegistryResult<i64> {
        Ok(self.snapshot.conn().set(UID_PATH, CLOBBER, b"")?)
    }

    /// Take the next free port from `/next-port`, retrying on contention.
    pub fn claim_next_port(&self) -> RegistryResult<i64> {
        loop {
            let sp = self.snapshot.fast_forward()?;
            let port = sp.get_file(NEXT_PORT_PATH, IntCodec).map_err(|e| match e {
                StoreError::NoEnt { .. } => RegistryError::InvalidState(
                    "registry is not initialized: /next-port is missing".to_string(),
                ),
                other => other.into(),
            })?;
            let claimed = port.value;
            match port.set(claimed + 1) {
                Ok(_) => return Ok(claimed),
                Err(StoreError::RevMismatch { .. }) => {
                    tracing::warn!(port = claimed, "port claim raced, retrying");
                    thread::sleep(PORT_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn get_proxies(&self) -> RegistryResult<Vec<String>> {
        getdir_or_empty(&self.snapshot.fast_forward()?, PROXIES_PATH)
    }

    pub fn register_proxy(&self, ip: &str) -> RegistryResult<Self> {
        let sp = self.snapshot.fast_forward()?;
        Ok(Self::new(sp.set(&format!("{PROXIES_PATH}/{ip}"), &timestamp())?))
    }

    pub fn unregister_proxy(&self, ip: &str) -> RegistryResult<()> {
        let sp = self.snapshot.fast_forward()?;
        Ok(sp.del(&format!("{PROXIES_PATH}/{ip}"))?)
    }

    pub fn get_pms(&self) -> RegistryResult<Vec<String>> {
        getdir_or_empty(&self.snapshot.fast_forward()?, PMS_PATH)
    }

    pub fn register_pm(&self, host: &str, version: &str) -> RegistryResult<Self> {
        let sp = self.snapshot.fast_forward()?;
        let body = format!("{} {version}", timestamp());
        Ok(Self::new(sp.set(&format!("{PMS_PATH}/{host}"), &body)?))
    }

    pub fn unregister_pm(&self, host: &str) -> RegistryResult<()> {
        let sp = self.snapshot.fast_forward()?;
        Ok(sp.del(&format!("{PMS_PATH}/{host}"))?)
    }
}

/// Children of `path`, or nothing when the directory does not exist.
pub(crate) fn getdir_or_empty(sp: &Snapshot, path: &str) -> RegistryResult<Vec<String>> {
    match sp.getdir(path) {
        Ok(names) => Ok(names),
        Err(StoreError::NoEnt { .. }) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
