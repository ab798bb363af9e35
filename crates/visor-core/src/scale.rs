use visor_store::Snapshot;

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{instance_path, parse_instance_id, Instance};
use crate::proc::{get_proc, proc_path, INSTANCES_PATH};
use crate::revision::get_revision;
use crate::store::{getdir_or_empty, Store};

/// Outcome of a `scale` call.
#[derive(Debug, Clone)]
pub struct ScaleChange {
    pub previous: usize,
    pub current: usize,
    /// Instances registered (scaling up) or asked to stop (scaling down).
    pub instances: Vec<Instance>,
}

/// Ids of instances of `app:proc@rev` that have no stop request, ascending.
fn running_ids(sp: &Snapshot, app: &str, rev: &str, proc: &str) -> RegistryResult<Vec<i64>> {
    let dir = format!("{}/{INSTANCES_PATH}/{rev}", proc_path(app, proc));
    let mut ids = Vec::new();
    for name in getdir_or_empty(sp, &dir)? {
        let id = parse_instance_id(&name)?;
        if !sp.exists(&format!("{}/stop", instance_path(id)))?.0 {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

impl Store {
    /// Number of live, non-stopping instances of `app:proc@rev`, with the
    /// revision it was read at.
    pub fn get_scale(&self, app: &str, rev: &str, proc: &str) -> RegistryResult<(usize, i64)> {
        let sp = self.snapshot().fast_forward()?;
        Ok((running_ids(&sp, app, rev, proc)?.len(), sp.rev()))
    }

    /// Bring `app:proc@rev` to `factor` instances.
    ///
    /// Scaling up registers pending instances in `env`; scaling down
    /// requests a stop on the newest surplus instances.
    pub fn scale(
        &self,
        app: &str,
        rev: &str,
        proc: &str,
        env: &str,
        factor: i64,
    ) -> RegistryResult<ScaleChange> {
        let target = usize::try_from(factor).map_err(|_| {
            RegistryError::InvalidArgument(format!("scaling factor can't be negative, got {factor}"))
        })?;
        let sp = self.snapshot().fast_forward()?;
        get_revision(app, rev, &sp)?;
        get_proc(app, proc, &sp)?;

        let ids = running_ids(&sp, app, rev, proc)?;
        let previous = ids.len();
        let mut instances = Vec::new();

        if target > previous {
            let store = Store::new(sp);
            for _ in previous..target {
                instances.push(store.register_instance(app, rev, proc, env)?);
            }
        } else if target < previous {
            let store = Store::new(sp);
            for id in ids.iter().rev().take(previous - target) {
                instances.push(store.get_instance(*id)?.stop()?);
            }
        }

        tracing::debug!(app, rev, proc, previous, target, "scaled");
        Ok(ScaleChange {
            previous,
            current: target,
            instances,
        })
    }
}
