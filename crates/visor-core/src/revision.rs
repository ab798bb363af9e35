use chrono::{DateTime, Utc};
use visor_store::{get_snapshotables, Dir, Snapshot, StoreError};

use crate::app::{get_app, App, APPS_PATH, REGISTERED_PATH};
use crate::error::{RegistryError, RegistryResult};
use crate::store::{getdir_or_empty, Store};
use crate::time::{format_time, parse_time};

const REVS_PATH: &str = "revs";
const ARCHIVE_URL_PATH: &str = "archive-url";

/// A build of an app, identified by a ref such as a commit id.
#[derive(Debug, Clone)]
pub struct Revision {
    dir: Dir,
    pub app_name: String,
    pub reference: String,
    pub archive_url: String,
    pub registered: Option<DateTime<Utc>>,
}

pub(crate) fn revision_path(app: &str, reference: &str) -> String {
    format!("{APPS_PATH}/{app}/{REVS_PATH}/{reference}")
}

impl Store {
    pub fn new_revision(&self, app: &App, reference: &str, archive_url: &str) -> Revision {
        Revision {
            dir: Dir::new(
                self.snapshot().clone(),
                &revision_path(&app.name, reference),
            ),
            app_name: app.name.clone(),
            reference: reference.to_string(),
            archive_url: archive_url.to_string(),
            registered: None,
        }
    }

    /// Every revision of every app.
    pub fn get_revisions(&self) -> RegistryResult<Vec<Revision>> {
        let sp = self.snapshot().fast_forward()?;
        let apps = getdir_or_empty(&sp, APPS_PATH)?;
        let per_app = get_snapshotables(&apps, |name| {
            let app = get_app(name, &sp)?;
            app_revisions(&app, &sp)
        })?;
        Ok(per_app.into_iter().flatten().collect())
    }
}

impl App {
    pub fn get_revision(&self, reference: &str) -> RegistryResult<Revision> {
        get_revision(&self.name, reference, &self.snapshot().fast_forward()?)
    }

    pub fn get_revisions(&self) -> RegistryResult<Vec<Revision>> {
        app_revisions(self, &self.snapshot().fast_forward()?)
    }
}

fn app_revisions(app: &App, sp: &Snapshot) -> RegistryResult<Vec<Revision>> {
    let refs = getdir_or_empty(sp, &app.dir().prefix(&[REVS_PATH]))?;
    get_snapshotables(&refs, |r| get_revision(&app.name, r, sp))
}

pub(crate) fn get_revision(app: &str, reference: &str, sp: &Snapshot) -> RegistryResult<Revision> {
    let dir = Dir::new(sp.clone(), &revision_path(app, reference));
    let not_found = || {
        RegistryError::NotFound(format!(
            "revision \"{reference}\" not found for app \"{app}\""
        ))
    };
    let archive_url = match dir.get(ARCHIVE_URL_PATH) {
        Ok(url) => url,
        Err(StoreError::NoEnt { .. }) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    let registered = match dir.get(REGISTERED_PATH) {
        Ok(t) => parse_time(&t)?,
        Err(StoreError::NoEnt { .. }) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    Ok(Revision {
        dir,
        app_name: app.to_string(),
        reference: reference.to_string(),
        archive_url,
        registered: Some(registered),
    })
}

impl Revision {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub fn register(mut self) -> RegistryResult<Self> {
        let sp = self.dir.snapshot.fast_forward()?;
        if sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::Conflict(format!(
                "revision \"{}\" of app \"{}\" is already registered",
                self.reference, self.app_name
            )));
        }
        let now = Utc::now();
        let dir = self
            .dir
            .join(sp)
            .set(ARCHIVE_URL_PATH, &self.archive_url)?
            .set(REGISTERED_PATH, &format_time(&now))?;
        self.dir = dir;
        self.registered = Some(now);
        Ok(self)
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        if !sp.exists(self.dir.name())?.0 {
            return Err(RegistryError::NotFound(format!(
                "revision \"{}\" not found for app \"{}\"",
                self.reference, self.app_name
            )));
        }
        Ok(self.dir.join(sp).del("/")?)
    }
}
