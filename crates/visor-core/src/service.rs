use chrono::{DateTime, Utc};
use visor_store::{get_snapshotables, Dir, Snapshot, StoreError};

use crate::app::REGISTERED_PATH;
use crate::endpoint::{get_endpoint, Endpoint, ENDPOINTS_PATH};
use crate::error::{RegistryError, RegistryResult};
use crate::store::{getdir_or_empty, Store};
use crate::time::{format_time, parse_time};

pub const SERVICES_PATH: &str = "/services";

/// A named set of endpoints, such as an external database.
#[derive(Debug, Clone)]
pub struct Service {
    pub(crate) dir: Dir,
    pub name: String,
    pub registered: Option<DateTime<Utc>>,
}

pub(crate) fn service_path(name: &str) -> String {
    format!("{SERVICES_PATH}/{name}")
}

impl Store {
    pub fn new_service(&self, name: &str) -> Service {
        Service {
            dir: Dir::new(self.snapshot().clone(), &service_path(name)),
            name: name.to_string(),
            registered: None,
        }
    }

    pub fn get_service(&self, name: &str) -> RegistryResult<Service> {
        get_service(name, &self.snapshot().fast_forward()?)
    }

    pub fn get_services(&self) -> RegistryResult<Vec<Service>> {
        let sp = self.snapshot().fast_forward()?;
        let names = getdir_or_empty(&sp, SERVICES_PATH)?;
        get_snapshotables(&names, |n| get_service(n, &sp))
    }
}

pub(crate) fn get_service(name: &str, sp: &Snapshot) -> RegistryResult<Service> {
    let dir = Dir::new(sp.clone(), &service_path(name));
    let registered = match dir.get(REGISTERED_PATH) {
        Ok(t) => parse_time(&t)?,
        Err(StoreError::NoEnt { .. }) => {
            return Err(RegistryError::NotFound(format!(
                "service \"{name}\" not found"
            )))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Service {
        dir,
        name: name.to_string(),
        registered: Some(registered),
    })
}

impl Service {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub fn register(mut self) -> RegistryResult<Self> {
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "service \"{}\" is already registered",
                self.name
            )));
        }
        let now = Utc::now();
        self.dir = self.dir.join(sp).set(REGISTERED_PATH, &format_time(&now))?;
        self.registered = Some(now);
        Ok(self)
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "service \"{}\" not found",
                self.name
            )));
        }
        Ok(self.dir.join(sp).del("/")?)
    }

    pub fn get_endpoints(&self) -> RegistryResult<Vec<Endpoint>> {
        let sp = self.dir.snapshot.fast_forward()?;
        let ids = getdir_or_empty(&sp, &self.dir.prefix(&[ENDPOINTS_PATH]))?;
        get_snapshotables(&ids, |id| get_endpoint(&self.name, id, &sp))
    }

    pub fn get_endpoint(&self, id: &str) -> RegistryResult<Endpoint> {
        get_endpoint(&self.name, id, &self.dir.snapshot.fast_forward()?)
    }
}
