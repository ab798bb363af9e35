use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use visor_store::{get_snapshotables, Dir, JsonCodec, Snapshot};

use crate::error::{RegistryError, RegistryResult};
use crate::store::{getdir_or_empty, Store};
use crate::time::{format_time, parse_time};

pub const APPS_PATH: &str = "/apps";
pub const DEPLOY_LXC: &str = "lxc";
pub(crate) const REGISTERED_PATH: &str = "registered";

const ATTRS_PATH: &str = "attrs";
const HEAD_PATH: &str = "head";
const ENV_PATH: &str = "env";

fn app_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[[:alnum:]][-[:alnum:]]*$").ok())
        .as_ref()
}

/// Environment variable names are stored one per file, so each must be a
/// single path segment. `-` is excluded because `_` is stored as `-`.
fn env_key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[_[:alnum:]][._[:alnum:]]*$").ok())
        .as_ref()
}

fn validate_env_key(key: &str) -> RegistryResult<()> {
    if env_key_regex().is_some_and(|re| re.is_match(key)) {
        Ok(())
    } else {
        Err(RegistryError::InvalidKey(format!(
            "invalid environment variable name \"{key}\""
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AppAttrs {
    #[serde(rename = "repo-url")]
    repo_url: String,
    stack: String,
    #[serde(rename = "deploy-type")]
    deploy_type: String,
}

/// A deployable application.
#[derive(Debug, Clone)]
pub struct App {
    pub(crate) dir: Dir,
    pub name: String,
    pub repo_url: String,
    pub stack: String,
    pub deploy_type: String,
    pub registered: Option<DateTime<Utc>>,
}

pub(crate) fn app_path(name: &str) -> String {
    format!("{APPS_PATH}/{name}")
}

/// Stored keys use `-` where callers use `_`.
fn env_key_to_path(key: &str) -> String {
    key.replace('_', "-")
}

fn env_key_from_path(key: &str) -> String {
    key.replace('-', "_")
}

impl Store {
    pub fn new_app(&self, name: &str, repo_url: &str, stack: &str) -> App {
        App {
            dir: Dir::new(self.snapshot().clone(), &app_path(name)),
            name: name.to_string(),
            repo_url: repo_url.to_string(),
            stack: stack.to_string(),
            deploy_type: String::new(),
            registered: None,
        }
    }

    pub fn get_app(&self, name: &str) -> RegistryResult<App> {
        get_app(name, &self.snapshot().fast_forward()?)
    }

    pub fn get_apps(&self) -> RegistryResult<Vec<App>> {
        let sp = self.snapshot().fast_forward()?;
        let names = getdir_or_empty(&sp, APPS_PATH)?;
        get_snapshotables(&names, |name| get_app(name, &sp))
    }
}

pub(crate) fn get_app(name: &str, sp: &Snapshot) -> RegistryResult<App> {
    let dir = Dir::new(sp.clone(), &app_path(name));
    let attrs = dir
        .get_file(ATTRS_PATH, JsonCodec::<AppAttrs>::new())
        .map_err(|e| match e {
            visor_store::StoreError::NoEnt { .. } => {
                RegistryError::NotFound(format!("app \"{name}\" not found"))
            }
            other => other.into(),
        })?
        .value;
    let registered = match dir.get(REGISTERED_PATH) {
        Ok(t) => Some(parse_time(&t)?),
        Err(visor_store::StoreError::NoEnt { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(App {
        dir,
        name: name.to_string(),
        repo_url: attrs.repo_url,
        stack: attrs.stack,
        deploy_type: attrs.deploy_type,
        registered,
    })
}

impl App {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub(crate) fn dir(&self) -> &Dir {
        &self.dir
    }

    pub fn register(mut self) -> RegistryResult<Self> {
        if !app_name_regex().is_some_and(|re| re.is_match(&self.name)) {
            return Err(RegistryError::BadName(self.name));
        }
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "app \"{}\" is already registered",
                self.name
            )));
        }
        if self.deploy_type.is_empty() {
            self.deploy_type = DEPLOY_LXC.to_string();
        }
        let attrs = AppAttrs {
            repo_url: self.repo_url.clone(),
            stack: self.stack.clone(),
            deploy_type: self.deploy_type.clone(),
        };
        let now = Utc::now();
        let dir = self
            .dir
            .join(sp)
            .set_file(ATTRS_PATH, &attrs, JsonCodec::<AppAttrs>::new())?
            .set(REGISTERED_PATH, &format_time(&now))?;
        tracing::debug!(app = %self.name, rev = dir.snapshot.rev(), "app registered");
        self.dir = dir;
        self.registered = Some(now);
        Ok(self)
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "app \"{}\" not found",
                self.name
            )));
        }
        Ok(self.dir.join(sp).del("/")?)
    }

    pub fn set_head(&self, rev: &str) -> RegistryResult<Self> {
        let dir = self.dir.fast_forward()?.set(HEAD_PATH, rev)?;
        Ok(Self {
            dir,
            ..self.clone()
        })
    }

    pub fn get_head(&self) -> RegistryResult<String> {
        match self.dir.get(HEAD_PATH) {
            Ok(head) => Ok(head),
            Err(visor_store::StoreError::NoEnt { .. }) => Err(RegistryError::NotFound(format!(
                "app \"{}\" has no head revision",
                self.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// All environment variables, as of this app's snapshot.
    pub fn environment_vars(&self) -> RegistryResult<BTreeMap<String, String>> {
        let keys = getdir_or_empty(&self.dir.snapshot, &self.dir.prefix(&[ENV_PATH]))?;
        let values = get_snapshotables(&keys, |key| {
            self.dir
                .get(&format!("{ENV_PATH}/{key}"))
                .map_err(RegistryError::from)
        })?;
        Ok(keys
            .iter()
            .map(|k| env_key_from_path(k))
            .zip(values)
            .collect())
    }

    pub fn get_environment_var(&self, key: &str) -> RegistryResult<String> {
        validate_env_key(key)?;
        let path = format!("{ENV_PATH}/{}", env_key_to_path(key));
        match self.dir.get(&path) {
            Ok(v) => Ok(v),
            Err(visor_store::StoreError::NoEnt { .. }) => Err(RegistryError::NotFound(format!(
                "environment variable \"{key}\" not found for app \"{}\"",
                self.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_environment_var(&self, key: &str, value: &str) -> RegistryResult<Self> {
        validate_env_key(key)?;
        let path = format!("{ENV_PATH}/{}", env_key_to_path(key));
        let dir = self.dir.fast_forward()?.set(&path, value)?;
        Ok(Self {
            dir,
            ..self.clone()
        })
    }

    pub fn del_environment_var(&self, key: &str) -> RegistryResult<Self> {
        validate_env_key(key)?;
        let dir = self.dir.fast_forward()?;
        let path = format!("{ENV_PATH}/{}", env_key_to_path(key));
        if !dir.exists(&path)? {
            return Err(RegistryError::NotFound(format!(
                "environment variable \"{key}\" not found for app \"{}\"",
                self.name
            )));
        }
        dir.del(&path)?;
        Ok(Self {
            dir: dir.fast_forward()?,
            ..self.clone()
        })
    }
}
