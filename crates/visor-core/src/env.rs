use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use visor_store::{get_snapshotables, Dir, JsonCodec, Snapshot, StoreError};

use crate::app::{App, REGISTERED_PATH};
use crate::error::{RegistryError, RegistryResult};
use crate::store::getdir_or_empty;
use crate::time::{format_time, parse_time};

const ENVS_PATH: &str = "envs";
const VARS_PATH: &str = "vars";

fn reference_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[[:alnum:]][-._[:alnum:]]*$").ok())
        .as_ref()
}

/// A named set of environment variables an instance can be started with.
#[derive(Debug, Clone)]
pub struct Env {
    dir: Dir,
    pub app_name: String,
    pub reference: String,
    pub vars: BTreeMap<String, String>,
    pub registered: Option<DateTime<Utc>>,
}

impl App {
    pub fn new_env(&self, reference: &str, vars: BTreeMap<String, String>) -> Env {
        Env {
            dir: Dir::new(
                self.snapshot().clone(),
                &self.dir().prefix(&[ENVS_PATH, reference]),
            ),
            app_name: self.name.clone(),
            reference: reference.to_string(),
            vars,
            registered: None,
        }
    }

    pub fn get_env(&self, reference: &str) -> RegistryResult<Env> {
        get_env(self, reference, &self.snapshot().fast_forward()?)
    }

    pub fn get_envs(&self) -> RegistryResult<Vec<Env>> {
        let sp = self.snapshot().fast_forward()?;
        let refs = getdir_or_empty(&sp, &self.dir().prefix(&[ENVS_PATH]))?;
        get_snapshotables(&refs, |r| get_env(self, r, &sp))
    }
}

pub(crate) fn get_env(app: &App, reference: &str, sp: &Snapshot) -> RegistryResult<Env> {
    let dir = Dir::new(sp.clone(), &app.dir().prefix(&[ENVS_PATH, reference]));
    let not_found = |what: &str| {
        RegistryError::NotFound(format!(
            "{what} not found for env \"{reference}\" of app \"{}\"",
            app.name
        ))
    };
    let vars = match dir.get_file(VARS_PATH, JsonCodec::<BTreeMap<String, String>>::new()) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => return Err(not_found("vars")),
        Err(e) => return Err(e.into()),
    };
    let registered = match dir.get(REGISTERED_PATH) {
        Ok(t) => parse_time(&t)?,
        Err(StoreError::NoEnt { .. }) => return Err(not_found("registration")),
        Err(e) => return Err(e.into()),
    };
    Ok(Env {
        dir,
        app_name: app.name.clone(),
        reference: reference.to_string(),
        vars,
        registered: Some(registered),
    })
}

impl Env {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub fn register(mut self) -> RegistryResult<Self> {
        if !reference_regex().is_some_and(|re| re.is_match(&self.reference)) {
            return Err(RegistryError::InvalidKey(format!(
                "invalid env reference \"{}\"",
                self.reference
            )));
        }
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "env \"{}\" can't be overwritten",
                self.reference
            )));
        }
        for key in self.vars.keys() {
            if key.is_empty() {
                return Err(RegistryError::InvalidKey("env keys can't be empty".to_string()));
            }
            if key.contains('=') {
                return Err(RegistryError::InvalidKey(format!(
                    "env key \"{key}\" can't contain \"=\""
                )));
            }
        }
        let now = Utc::now();
        let dir = self
            .dir
            .join(sp)
            .set_file(VARS_PATH, &self.vars, JsonCodec::<BTreeMap<String, String>>::new())?
            .set(REGISTERED_PATH, &format_time(&now))?;
        self.dir = dir;
        self.registered = Some(now);
        Ok(self)
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "env \"{}\" not found",
                self.reference
            )));
        }
        Ok(self.dir.join(sp).del("/")?)
    }
}
