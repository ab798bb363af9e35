use std::net::{IpAddr, ToSocketAddrs};

use visor_store::{Dir, ListCodec, Snapshot, StoreError};

use crate::error::{RegistryError, RegistryResult};
use crate::service::{service_path, Service};

pub(crate) const ENDPOINTS_PATH: &str = "endpoints";

/// One address a service can be reached at.
#[derive(Debug, Clone)]
pub struct Endpoint {
    dir: Dir,
    pub service: String,
    pub ip: String,
    pub port: u16,
    pub priority: i64,
    pub weight: i64,
    /// The address as given at registration, before resolution.
    pub target: String,
}

fn endpoint_id(ip: &str, port: u16) -> String {
    format!("{}-{port}", ip.replace(['.', ':'], "-"))
}

fn resolve(addr: &str, port: u16) -> RegistryResult<IpAddr> {
    let all: Vec<_> = (addr, port)
        .to_socket_addrs()
        .map_err(|e| RegistryError::InvalidArgument(format!("can't resolve \"{addr}\": {e}")))?
        .collect();
    all.iter()
        .find(|a| a.is_ipv4())
        .or_else(|| all.first())
        .map(|a| a.ip())
        .ok_or_else(|| RegistryError::InvalidArgument(format!("\"{addr}\" has no addresses")))
}

impl Service {
    /// A new endpoint for `addr:port`. The address is resolved to an IP.
    pub fn new_endpoint(&self, addr: &str, port: u16) -> RegistryResult<Endpoint> {
        let ip = resolve(addr, port)?.to_string();
        let path = format!(
            "{}/{ENDPOINTS_PATH}/{}",
            service_path(&self.name),
            endpoint_id(&ip, port)
        );
        Ok(Endpoint {
            dir: Dir::new(self.snapshot().clone(), &path),
            service: self.name.clone(),
            ip,
            port,
            priority: 0,
            weight: 0,
            target: addr.to_string(),
        })
    }
}

pub(crate) fn get_endpoint(service: &str, id: &str, sp: &Snapshot) -> RegistryResult<Endpoint> {
    let path = format!("{}/{ENDPOINTS_PATH}/{id}", service_path(service));
    let fields = match sp.get_file(&path, ListCodec) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => {
            return Err(RegistryError::NotFound(format!(
                "endpoint \"{id}\" not found for service \"{service}\""
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let [ip, priority, weight, port, target] = fields.as_slice() else {
        return Err(RegistryError::InvalidState(format!(
            "malformed endpoint \"{id}\": {fields:?}"
        )));
    };
    let bad = |field: &str, value: &str| {
        RegistryError::InvalidState(format!("bad {field} \"{value}\" in endpoint \"{id}\""))
    };
    Ok(Endpoint {
        dir: Dir::new(sp.clone(), &path),
        service: service.to_string(),
        ip: ip.clone(),
        priority: priority.parse().map_err(|_| bad("priority", priority))?,
        weight: weight.parse().map_err(|_| bad("weight", weight))?,
        port: port.parse().map_err(|_| bad("port", port))?,
        target: target.clone(),
    })
}

impl Endpoint {
    pub fn id(&self) -> String {
        endpoint_id(&self.ip, self.port)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.ip.clone(),
            self.priority.to_string(),
            self.weight.to_string(),
            self.port.to_string(),
            self.target.clone(),
        ]
    }

    pub fn register(&self) -> RegistryResult<Self> {
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "endpoint \"{}\" is already registered for service \"{}\"",
                self.id(),
                self.service
            )));
        }
        let body = self.fields().join(" ");
        let sp = sp.set(self.dir.name(), &body)?;
        Ok(Self {
            dir: self.dir.join(sp),
            ..self.clone()
        })
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "endpoint \"{}\" not found for service \"{}\"",
                self.id(),
                self.service
            )));
        }
        Ok(sp.del(self.dir.name())?)
    }
}
