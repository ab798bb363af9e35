use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use visor_store::{get_snapshotables, Dir, IntCodec, JsonCodec, Snapshot, StoreError};

use crate::app::{App, APPS_PATH, REGISTERED_PATH};
use crate::error::{RegistryError, RegistryResult};
use crate::instance::{get_instance, parse_instance_id, Instance};
use crate::store::{getdir_or_empty, Store};
use crate::time::{format_time, parse_time};

const PROCS_PATH: &str = "procs";
const PORT_PATH: &str = "port";
const ATTRS_PATH: &str = "attrs";
pub(crate) const INSTANCES_PATH: &str = "instances";
pub(crate) const FAILED_PATH: &str = "failed";
pub(crate) const LOST_PATH: &str = "lost";

fn proc_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[[:alnum:]]+$").ok()).as_ref()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum memory in MB for one instance of the proc.
    #[serde(rename = "memory-limit-mb", skip_serializing_if = "Option::is_none", default)]
    pub memory_limit_mb: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcAttrs {
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// A process type of an app (`web`, `worker`, ...), with its own port.
#[derive(Debug, Clone)]
pub struct Proc {
    dir: Dir,
    pub app_name: String,
    pub name: String,
    pub port: i64,
    pub attrs: ProcAttrs,
    pub registered: Option<DateTime<Utc>>,
}

pub(crate) fn proc_path(app: &str, proc: &str) -> String {
    format!("{APPS_PATH}/{app}/{PROCS_PATH}/{proc}")
}

/// Where an instance is listed under its proc while it is live.
pub(crate) fn proc_instance_path(app: &str, rev: &str, proc: &str, id: i64) -> String {
    format!("{}/{INSTANCES_PATH}/{rev}/{id}", proc_path(app, proc))
}

impl Store {
    pub fn new_proc(&self, app: &App, name: &str) -> Proc {
        Proc {
            dir: Dir::new(self.snapshot().clone(), &proc_path(&app.name, name)),
            app_name: app.name.clone(),
            name: name.to_string(),
            port: 0,
            attrs: ProcAttrs::default(),
            registered: None,
        }
    }
}

impl App {
    pub fn get_proc(&self, name: &str) -> RegistryResult<Proc> {
        get_proc(&self.name, name, &self.snapshot().fast_forward()?)
    }

    pub fn get_procs(&self) -> RegistryResult<Vec<Proc>> {
        let sp = self.snapshot().fast_forward()?;
        let names = getdir_or_empty(&sp, &self.dir().prefix(&[PROCS_PATH]))?;
        get_snapshotables(&names, |n| get_proc(&self.name, n, &sp))
    }
}

pub(crate) fn get_proc(app: &str, name: &str, sp: &Snapshot) -> RegistryResult<Proc> {
    let dir = Dir::new(sp.clone(), &proc_path(app, name));
    let port = match dir.get_file(PORT_PATH, IntCodec) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => {
            return Err(RegistryError::NotFound(format!(
                "proc \"{name}\" not found for app \"{app}\""
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let attrs = match dir.get_file(ATTRS_PATH, JsonCodec::<ProcAttrs>::new()) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => ProcAttrs::default(),
        Err(e) => return Err(e.into()),
    };
    let registered = match dir.get(REGISTERED_PATH) {
        Ok(t) => parse_time(&t)?,
        Err(StoreError::NoEnt { .. }) => {
            return Err(RegistryError::NotFound(format!(
                "registration not found for proc \"{app}:{name}\""
            )))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Proc {
        dir,
        app_name: app.to_string(),
        name: name.to_string(),
        port,
        attrs,
        registered: Some(registered),
    })
}

impl Proc {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub fn register(mut self) -> RegistryResult<Self> {
        if !proc_name_regex().is_some_and(|re| re.is_match(&self.name)) {
            return Err(RegistryError::BadProcName(self.name));
        }
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "proc \"{}\" of app \"{}\" is already registered",
                self.name, self.app_name
            )));
        }
        let store = Store::new(sp);
        self.port = store.claim_next_port()?;
        let now = Utc::now();
        let dir = self
            .dir
            .join(store.snapshot().fast_forward()?)
            .set_file(PORT_PATH, &self.port, IntCodec)?
            .set(REGISTERED_PATH, &format_time(&now))?;
        tracing::debug!(app = %self.app_name, proc = %self.name, port = self.port, "proc registered");
        self.dir = dir;
        self.registered = Some(now);
        Ok(self)
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "proc \"{}\" not found for app \"{}\"",
                self.name, self.app_name
            )));
        }
        Ok(self.dir.join(sp).del("/")?)
    }

    pub fn store_attrs(&self) -> RegistryResult<Self> {
        let dir = self
            .dir
            .fast_forward()?
            .set_file(ATTRS_PATH, &self.attrs, JsonCodec::<ProcAttrs>::new())?;
        Ok(Self {
            dir,
            ..self.clone()
        })
    }

    /// Live instances across all revisions.
    pub fn get_instances(&self) -> RegistryResult<Vec<Instance>> {
        let sp = self.dir.snapshot.fast_forward()?;
        let mut ids = Vec::new();
        for rev in getdir_or_empty(&sp, &self.dir.prefix(&[INSTANCES_PATH]))? {
            ids.extend(getdir_or_empty(&sp, &self.dir.prefix(&[INSTANCES_PATH, rev.as_str()]))?);
        }
        instances_by_id(&ids, &sp)
    }

    pub fn get_failed_instances(&self) -> RegistryResult<Vec<Instance>> {
        let sp = self.dir.snapshot.fast_forward()?;
        let ids = getdir_or_empty(&sp, &self.dir.prefix(&[FAILED_PATH]))?;
        instances_by_id(&ids, &sp)
    }

    pub fn get_lost_instances(&self) -> RegistryResult<Vec<Instance>> {
        let sp = self.dir.snapshot.fast_forward()?;
        let ids = getdir_or_empty(&sp, &self.dir.prefix(&[LOST_PATH]))?;
        instances_by_id(&ids, &sp)
    }

    pub fn num_instances(&self) -> RegistryResult<usize> {
        let sp = self.dir.snapshot.fast_forward()?;
        let mut total = 0;
        for rev in getdir_or_empty(&sp, &self.dir.prefix(&[INSTANCES_PATH]))? {
            total += sp.stat(&self.dir.prefix(&[INSTANCES_PATH, rev.as_str()]))?.0;
        }
        Ok(total)
    }

    /// Revisions that currently have live instances.
    pub fn get_running_revs(&self) -> RegistryResult<Vec<String>> {
        let sp = self.dir.snapshot.fast_forward()?;
        getdir_or_empty(&sp, &self.dir.prefix(&[INSTANCES_PATH]))
    }
}

pub(crate) fn instances_by_id(ids: &[String], sp: &Snapshot) -> RegistryResult<Vec<Instance>> {
    let mut instances = get_snapshotables(ids, |id| get_instance(parse_instance_id(id)?, sp))?;
    instances.sort_by_key(|i| i.id);
    Ok(instances)
}
