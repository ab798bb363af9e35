//! Instance lifecycle.
//!
//! An instance is one running copy of an `app:proc@rev`. It is registered
//! as `pending`, claimed by a host, reported `running` once started, and
//! finally stopped, failed or lost:
//!
//! ```text
//! pending -> claimed -> running -> exited
//!    ^          |          |
//!    +--unclaim-+          +------> failed | lost
//! ```
//!
//! Every transition returns a new `Instance` positioned at the revision of
//! its last write.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use visor_store::{Dir, ListCodec, Snapshot, StoreError};

use crate::error::{RegistryError, RegistryResult};
use crate::proc::{proc_instance_path, proc_path, FAILED_PATH, LOST_PATH};
use crate::store::{getdir_or_empty, Store};
use crate::time::timestamp;

pub const INSTANCES_PATH: &str = "/instances";

const OBJECT_PATH: &str = "object";
const STATUS_PATH: &str = "status";
const START_PATH: &str = "start";
const CLAIMS_PATH: &str = "claims";
const STOP_PATH: &str = "stop";
const REASON_PATH: &str = "reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsStatus {
    Pending,
    Claimed,
    Running,
    Exited,
    Failed,
    Lost,
}

impl InsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsStatus::Pending => "pending",
            InsStatus::Claimed => "claimed",
            InsStatus::Running => "running",
            InsStatus::Exited => "exited",
            InsStatus::Failed => "failed",
            InsStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for InsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(InsStatus::Pending),
            "claimed" => Ok(InsStatus::Claimed),
            "running" => Ok(InsStatus::Running),
            "exited" => Ok(InsStatus::Exited),
            "failed" => Ok(InsStatus::Failed),
            "lost" => Ok(InsStatus::Lost),
            other => Err(RegistryError::InvalidState(format!(
                "unknown instance status \"{other}\""
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instance {
    dir: Dir,
    pub id: i64,
    pub app_name: String,
    pub rev_name: String,
    pub proc_name: String,
    pub env: String,
    pub status: InsStatus,
    /// Host holding the claim, if any.
    pub claimer: Option<String>,
    pub ip: String,
    pub port: i64,
    pub host: String,
    pub tele_port: i64,
    pub stop_requested: bool,
    pub reason: Option<String>,
}

pub(crate) fn instance_path(id: i64) -> String {
    format!("{INSTANCES_PATH}/{id}")
}

pub(crate) fn parse_instance_id(s: &str) -> RegistryResult<i64> {
    s.trim()
        .parse()
        .map_err(|_| RegistryError::InvalidArgument(format!("\"{s}\" is not an instance id")))
}

/// Parsed contents of the `start` file:
/// `""`, `"<claimer>"` or `"<ip> <port> <host> <tele-port>"`.
#[derive(Debug, Default)]
struct StartInfo {
    claimer: Option<String>,
    ip: String,
    port: i64,
    host: String,
    tele_port: i64,
}

fn parse_start(body: &str) -> RegistryResult<StartInfo> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    match fields.as_slice() {
        [] => Ok(StartInfo::default()),
        [claimer] => Ok(StartInfo {
            claimer: Some(claimer.to_string()),
            ..StartInfo::default()
        }),
        [ip, port, host, tele_port] => {
            let num = |s: &str| {
                s.parse::<i64>().map_err(|_| {
                    RegistryError::InvalidState(format!("bad port \"{s}\" in start \"{body}\""))
                })
            };
            Ok(StartInfo {
                claimer: Some(ip.to_string()),
                ip: ip.to_string(),
                port: num(port)?,
                host: host.to_string(),
                tele_port: num(tele_port)?,
            })
        }
        _ => Err(RegistryError::InvalidState(format!(
            "malformed start \"{body}\""
        ))),
    }
}

fn not_found(id: i64) -> RegistryError {
    RegistryError::NotFound(format!("instance {id} not found"))
}

pub(crate) fn get_instance(id: i64, sp: &Snapshot) -> RegistryResult<Instance> {
    let dir = Dir::new(sp.clone(), &instance_path(id));
    let status: InsStatus = match dir.get(STATUS_PATH) {
        Ok(s) => s.parse()?,
        Err(StoreError::NoEnt { .. }) => return Err(not_found(id)),
        Err(e) => return Err(e.into()),
    };
    let object = match dir.get_file(OBJECT_PATH, ListCodec) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => return Err(not_found(id)),
        Err(e) => return Err(e.into()),
    };
    let [app, rev, proc, env] = object.as_slice() else {
        return Err(RegistryError::InvalidState(format!(
            "malformed object for instance {id}: {object:?}"
        )));
    };
    let start = match dir.get(START_PATH) {
        Ok(s) => parse_start(&s)?,
        Err(StoreError::NoEnt { .. }) => StartInfo::default(),
        Err(e) => return Err(e.into()),
    };
    let reason = match dir.get(REASON_PATH) {
        Ok(r) => Some(r),
        Err(StoreError::NoEnt { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let stop_requested = dir.exists(STOP_PATH)?;
    Ok(Instance {
        id,
        app_name: app.clone(),
        rev_name: rev.clone(),
        proc_name: proc.clone(),
        env: env.clone(),
        status,
        claimer: start.claimer,
        ip: start.ip,
        port: start.port,
        host: start.host,
        tele_port: start.tele_port,
        stop_requested,
        reason,
        dir,
    })
}

fn del_if_exists(sp: &Snapshot, path: &str) -> RegistryResult<()> {
    if sp.exists(path)?.0 {
        sp.del(path)?;
    }
    Ok(())
}

impl Store {
    /// Create a pending instance of `app:proc@rev` in environment `env`.
    pub fn register_instance(
        &self,
        app: &str,
        rev: &str,
        proc: &str,
        env: &str,
    ) -> RegistryResult<Instance> {
        let id = self.getuid()?;
        let sp = self.snapshot().fast_forward()?;
        let dir = Dir::new(sp, &instance_path(id))
            .set(STATUS_PATH, InsStatus::Pending.as_str())?
            .set(START_PATH, "")?;
        let sp = dir
            .snapshot
            .set(&proc_instance_path(app, rev, proc, id), &timestamp())?;
        // The object goes last: its creation is the registration event and
        // readers need the rest of the instance in place by then.
        let object = vec![
            app.to_string(),
            rev.to_string(),
            proc.to_string(),
            env.to_string(),
        ];
        let dir = dir.join(sp).set_file(OBJECT_PATH, &object, ListCodec)?;
        tracing::debug!(id, app, rev, proc, "instance registered");
        get_instance(id, &dir.snapshot)
    }

    pub fn get_instance(&self, id: i64) -> RegistryResult<Instance> {
        get_instance(id, &self.snapshot().fast_forward()?)
    }

    /// Every instance known to the registry, oldest first.
    pub fn get_instances(&self) -> RegistryResult<Vec<Instance>> {
        let sp = self.snapshot().fast_forward()?;
        let ids = getdir_or_empty(&sp, INSTANCES_PATH)?;
        crate::proc::instances_by_id(&ids, &sp)
    }

    /// Blocking iterator over newly registered instances.
    pub fn watch_instance_start(&self) -> InstanceWatch {
        InstanceWatch {
            snapshot: self.snapshot().clone(),
            rev: self.rev(),
            timeout: None,
        }
    }
}

impl Instance {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    /// The same instance at the latest revision.
    pub fn fast_forward(&self) -> RegistryResult<Self> {
        get_instance(self.id, &self.dir.snapshot.fast_forward()?)
    }

    fn reload(&self, dir: &Dir) -> RegistryResult<Self> {
        get_instance(self.id, &dir.snapshot)
    }

    fn latest(&self) -> RegistryResult<(Dir, Instance)> {
        let dir = self.dir.fast_forward()?;
        let current = self.reload(&dir)?;
        Ok((dir, current))
    }

    fn proc_instance_path(&self) -> String {
        proc_instance_path(&self.app_name, &self.rev_name, &self.proc_name, self.id)
    }

    fn proc_sub_path(&self, sub: &str) -> String {
        format!(
            "{}/{sub}/{}",
            proc_path(&self.app_name, &self.proc_name),
            self.id
        )
    }

    fn require_claimer(&self, current: &Instance, host: &str) -> RegistryResult<()> {
        if current.claimer.as_deref() == Some(host) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized(format!(
                "instance {} is not claimed by {host}",
                self.id
            )))
        }
    }

    /// Lock the instance to `host`.
    ///
    /// The write is guarded on this instance's own revision: a stale handle
    /// fails with `RevMismatch` even if the instance was since unclaimed.
    pub fn claim(&self, host: &str) -> RegistryResult<Self> {
        let start = match self.dir.get(START_PATH) {
            Ok(s) => s,
            Err(StoreError::NoEnt { .. }) => {
                return Err(RegistryError::InvalidState(format!(
                    "instance {} has no start field",
                    self.id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if !start.trim().is_empty() {
            return Err(RegistryError::InsClaimed(self.id));
        }
        let dir = self
            .dir
            .set(START_PATH, host)?
            .set(&format!("{CLAIMS_PATH}/{host}"), &timestamp())?
            .set(STATUS_PATH, InsStatus::Claimed.as_str())?;
        tracing::debug!(id = self.id, host, "instance claimed");
        self.reload(&dir)
    }

    /// Release the claim held by `host`.
    pub fn unclaim(&self, host: &str) -> RegistryResult<Self> {
        let (dir, current) = self.latest()?;
        self.require_claimer(&current, host)?;
        let dir = dir
            .set(START_PATH, "")?
            .set(STATUS_PATH, InsStatus::Pending.as_str())?;
        self.reload(&dir)
    }

    /// Report the instance as running at `ip:port` on `host`.
    pub fn started(&self, ip: &str, host: &str, port: i64, tele_port: i64) -> RegistryResult<Self> {
        let (dir, current) = self.latest()?;
        self.require_claimer(&current, ip)?;
        if current.status != InsStatus::Claimed {
            return Err(RegistryError::InvalidState(format!(
                "instance {} is {}, expected claimed",
                self.id, current.status
            )));
        }
        let dir = dir
            .set(START_PATH, &format!("{ip} {port} {host} {tele_port}"))?
            .set(STATUS_PATH, InsStatus::Running.as_str())?;
        self.reload(&dir)
    }

    /// Request the instance to stop.
    pub fn stop(&self) -> RegistryResult<Self> {
        let (dir, _) = self.latest()?;
        let dir = dir.set(STOP_PATH, &timestamp())?;
        tracing::debug!(id = self.id, "instance stop requested");
        self.reload(&dir)
    }

    /// Confirm a requested stop.
    pub fn exited(&self, host: &str) -> RegistryResult<Self> {
        let (dir, current) = self.latest()?;
        if !current.stop_requested {
            return Err(RegistryError::InvalidState(format!(
                "instance {} has no stop request",
                self.id
            )));
        }
        self.require_claimer(&current, host)?;
        let dir = dir.set(STATUS_PATH, InsStatus::Exited.as_str())?;
        del_if_exists(&dir.snapshot, &self.proc_instance_path())?;
        self.reload(&dir.fast_forward()?)
    }

    pub fn failed(&self, host: &str, reason: &str) -> RegistryResult<Self> {
        let (dir, current) = self.latest()?;
        self.require_claimer(&current, host)?;
        self.retire(dir, InsStatus::Failed, FAILED_PATH, reason)
    }

    /// Mark the instance lost, as observed by `by`.
    pub fn lost(&self, by: &str, reason: &str) -> RegistryResult<Self> {
        let (dir, _) = self.latest()?;
        self.retire(dir, InsStatus::Lost, LOST_PATH, &format!("{by}: {reason}"))
    }

    fn retire(&self, dir: Dir, status: InsStatus, list: &str, reason: &str) -> RegistryResult<Self> {
        let dir = dir
            .set(REASON_PATH, reason)?
            .set(STATUS_PATH, status.as_str())?;
        let sp = dir.snapshot.set(&self.proc_sub_path(list), &timestamp())?;
        del_if_exists(&sp, &self.proc_instance_path())?;
        tracing::debug!(id = self.id, status = %status, reason, "instance retired");
        get_instance(self.id, &sp.fast_forward()?)
    }

    /// Remove the instance and its bookkeeping under the proc.
    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        del_if_exists(&sp, &self.proc_instance_path())?;
        del_if_exists(&sp, &self.proc_sub_path(FAILED_PATH))?;
        del_if_exists(&sp, &self.proc_sub_path(LOST_PATH))?;
        Ok(self.dir.join(sp).del("/")?)
    }

    /// Hosts that ever claimed this instance.
    pub fn claims(&self) -> RegistryResult<Vec<String>> {
        let sp = self.dir.snapshot.fast_forward()?;
        getdir_or_empty(&sp, &self.dir.prefix(&[CLAIMS_PATH]))
    }

    pub fn wait_claimed(&self, timeout: Duration) -> RegistryResult<Self> {
        self.wait_for(STATUS_PATH, Some(InsStatus::Claimed), timeout)
    }

    pub fn wait_started(&self, timeout: Duration) -> RegistryResult<Self> {
        self.wait_for(STATUS_PATH, Some(InsStatus::Running), timeout)
    }

    pub fn wait_stop(&self, timeout: Duration) -> RegistryResult<Self> {
        self.wait_for(STOP_PATH, None, timeout)
    }

    fn wait_for(
        &self,
        file: &str,
        status: Option<InsStatus>,
        timeout: Duration,
    ) -> RegistryResult<Self> {
        let path = self.dir.prefix(&[file]);
        let conn = self.dir.snapshot.conn();
        let deadline = Instant::now() + timeout;
        let mut rev = self.dir.snapshot.rev();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(event) = conn.wait(&path, rev + 1, Some(remaining))? else {
                return Err(RegistryError::Timeout(format!("{path} on instance {}", self.id)));
            };
            rev = event.rev;
            let matched = event.is_set()
                && status.map_or(true, |s| event.body_str().trim() == s.as_str());
            if matched {
                return get_instance(self.id, &self.dir.snapshot.fast_forward_to(rev));
            }
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Instance<{}>{{{}:{}@{} {}}}",
            self.id, self.app_name, self.proc_name, self.rev_name, self.status
        )
    }
}

/// Blocking iterator over instances registered after a snapshot.
#[derive(Debug)]
pub struct InstanceWatch {
    snapshot: Snapshot,
    rev: i64,
    timeout: Option<Duration>,
}

impl InstanceWatch {
    /// Stop iterating when no registration arrives within `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Iterator for InstanceWatch {
    type Item = RegistryResult<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        let glob = format!("{INSTANCES_PATH}/*/{OBJECT_PATH}");
        loop {
            let event = match self.snapshot.conn().wait(&glob, self.rev + 1, self.timeout) {
                Ok(Some(event)) => event,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.rev = event.rev;
            if !event.is_set() {
                continue;
            }
            let id = match event.path.split('/').nth(2).map(parse_instance_id) {
                Some(Ok(id)) => id,
                Some(Err(e)) => return Some(Err(e)),
                None => continue,
            };
            return Some(get_instance(id, &self.snapshot.fast_forward_to(event.rev)));
        }
    }
}
