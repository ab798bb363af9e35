//! Registry change events.
//!
//! Every write to the coordinator is a raw event. [`EventWatcher`] matches
//! the event path against the registry layout, classifies it, and loads the
//! entity it refers to as of the event's revision.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use visor_store::{RawEvent, Snapshot};

use crate::app::{get_app, App};
use crate::endpoint::{get_endpoint, Endpoint};
use crate::env::{get_env, Env};
use crate::error::{RegistryError, RegistryResult};
use crate::instance::{get_instance, parse_instance_id, InsStatus, Instance};
use crate::proc::{get_proc, Proc};
use crate::revision::{get_revision, Revision};
use crate::runner::{get_runner, Runner};
use crate::service::{get_service, Service};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AppRegister,
    AppUnregister,
    RevRegister,
    RevUnregister,
    ProcRegister,
    ProcUnregister,
    EnvRegister,
    EnvUnregister,
    InstanceRegister,
    InstanceUnregister,
    InstanceClaim,
    InstanceUnclaim,
    InstanceStart,
    InstanceStop,
    InstanceExit,
    InstanceFail,
    InstanceLost,
    ServiceRegister,
    ServiceUnregister,
    EndpointRegister,
    EndpointUnregister,
    RunnerRegister,
    RunnerUnregister,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AppRegister => "app-register",
            EventKind::AppUnregister => "app-unregister",
            EventKind::RevRegister => "rev-register",
            EventKind::RevUnregister => "rev-unregister",
            EventKind::ProcRegister => "proc-register",
            EventKind::ProcUnregister => "proc-unregister",
            EventKind::EnvRegister => "env-register",
            EventKind::EnvUnregister => "env-unregister",
            EventKind::InstanceRegister => "instance-register",
            EventKind::InstanceUnregister => "instance-unregister",
            EventKind::InstanceClaim => "instance-claim",
            EventKind::InstanceUnclaim => "instance-unclaim",
            EventKind::InstanceStart => "instance-start",
            EventKind::InstanceStop => "instance-stop",
            EventKind::InstanceExit => "instance-exit",
            EventKind::InstanceFail => "instance-fail",
            EventKind::InstanceLost => "instance-lost",
            EventKind::ServiceRegister => "service-register",
            EventKind::ServiceUnregister => "service-unregister",
            EventKind::EndpointRegister => "endpoint-register",
            EventKind::EndpointUnregister => "endpoint-unregister",
            EventKind::RunnerRegister => "runner-register",
            EventKind::RunnerUnregister => "runner-unregister",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry names extracted from an event path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPath {
    pub app: Option<String>,
    pub revision: Option<String>,
    pub proc: Option<String>,
    pub env: Option<String>,
    pub instance: Option<String>,
    pub service: Option<String>,
    pub endpoint: Option<String>,
    /// Runner address as `host:port`.
    pub runner: Option<String>,
}

impl fmt::Display for EventPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("app", &self.app),
            ("rev", &self.revision),
            ("proc", &self.proc),
            ("env", &self.env),
            ("instance", &self.instance),
            ("service", &self.service),
            ("endpoint", &self.endpoint),
            ("runner", &self.runner),
        ];
        let parts: Vec<String> = fields
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| format!("{name}: {v}")))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// The entity an event refers to, loaded at the event's revision.
#[derive(Debug, Clone)]
pub enum EventSource {
    App(App),
    Revision(Revision),
    Proc(Proc),
    Env(Env),
    Instance(Instance),
    Service(Service),
    Endpoint(Endpoint),
    Runner(Runner),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub body: String,
    pub path: EventPath,
    pub source: Option<EventSource>,
    pub rev: i64,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.rev, self.kind, self.path)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    App,
    Rev,
    Proc,
    Env,
    Instance,
    InstanceStatus,
    InstanceStop,
    Service,
    Endpoint,
    Runner,
}

const NAME: &str = "([-.[:alnum:]]+)";

fn patterns() -> &'static [(Regex, Pattern)] {
    static TABLE: OnceLock<Vec<(Regex, Pattern)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            (format!("^/apps/{NAME}/registered$"), Pattern::App),
            (format!("^/apps/{NAME}/revs/{NAME}/registered$"), Pattern::Rev),
            (format!("^/apps/{NAME}/procs/{NAME}/registered$"), Pattern::Proc),
            (format!("^/apps/{NAME}/envs/{NAME}/registered$"), Pattern::Env),
            ("^/instances/([0-9]+)/object$".to_string(), Pattern::Instance),
            ("^/instances/([0-9]+)/status$".to_string(), Pattern::InstanceStatus),
            ("^/instances/([0-9]+)/stop$".to_string(), Pattern::InstanceStop),
            (format!("^/services/{NAME}/registered$"), Pattern::Service),
            (format!("^/services/{NAME}/endpoints/{NAME}$"), Pattern::Endpoint),
            (format!("^/runners/{NAME}/([0-9]+)$"), Pattern::Runner),
        ]
        .into_iter()
        .filter_map(|(re, pattern)| Regex::new(&re).ok().map(|re| (re, pattern)))
        .collect()
    })
}

fn set_or_del(raw: &RawEvent, set: EventKind, del: EventKind) -> EventKind {
    if raw.is_set() {
        set
    } else {
        del
    }
}

/// Classify a raw event. `sp` must be at the event's revision.
fn classify(raw: &RawEvent, sp: &Snapshot) -> RegistryResult<(EventKind, EventPath)> {
    let mut path = EventPath::default();
    let Some((caps, pattern)) = patterns()
        .iter()
        .find_map(|(re, pattern)| re.captures(&raw.path).map(|c| (c, *pattern)))
    else {
        return Ok((EventKind::Unknown, path));
    };
    let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

    let kind = match pattern {
        Pattern::App => {
            path.app = group(1);
            set_or_del(raw, EventKind::AppRegister, EventKind::AppUnregister)
        }
        Pattern::Rev => {
            path.app = group(1);
            path.revision = group(2);
            set_or_del(raw, EventKind::RevRegister, EventKind::RevUnregister)
        }
        Pattern::Proc => {
            path.app = group(1);
            path.proc = group(2);
            set_or_del(raw, EventKind::ProcRegister, EventKind::ProcUnregister)
        }
        Pattern::Env => {
            path.app = group(1);
            path.env = group(2);
            set_or_del(raw, EventKind::EnvRegister, EventKind::EnvUnregister)
        }
        Pattern::Instance => {
            path.instance = group(1);
            set_or_del(raw, EventKind::InstanceRegister, EventKind::InstanceUnregister)
        }
        Pattern::InstanceStatus => {
            path.instance = group(1);
            if raw.is_del() {
                EventKind::Unknown
            } else {
                status_kind(raw, sp)?
            }
        }
        Pattern::InstanceStop => {
            path.instance = group(1);
            set_or_del(raw, EventKind::InstanceStop, EventKind::Unknown)
        }
        Pattern::Service => {
            path.service = group(1);
            set_or_del(raw, EventKind::ServiceRegister, EventKind::ServiceUnregister)
        }
        Pattern::Endpoint => {
            path.service = group(1);
            path.endpoint = group(2);
            set_or_del(raw, EventKind::EndpointRegister, EventKind::EndpointUnregister)
        }
        Pattern::Runner => {
            path.runner = match (group(1), group(2)) {
                (Some(host), Some(port)) => Some(format!("{host}:{port}")),
                _ => None,
            };
            set_or_del(raw, EventKind::RunnerRegister, EventKind::RunnerUnregister)
        }
    };
    Ok((kind, path))
}

fn status_kind(raw: &RawEvent, sp: &Snapshot) -> RegistryResult<EventKind> {
    let Ok(status) = raw.body_str().parse::<InsStatus>() else {
        return Ok(EventKind::Unknown);
    };
    Ok(match status {
        InsStatus::Claimed => EventKind::InstanceClaim,
        InsStatus::Running => EventKind::InstanceStart,
        InsStatus::Exited => EventKind::InstanceExit,
        InsStatus::Failed => EventKind::InstanceFail,
        InsStatus::Lost => EventKind::InstanceLost,
        InsStatus::Pending => {
            // Registration writes the status before the object; only a
            // pending status on an existing instance is an unclaim.
            let dir = raw.path.trim_end_matches("/status");
            let (exists, rev) = sp.exists(&format!("{dir}/object"))?;
            if exists && rev < raw.rev {
                EventKind::InstanceUnclaim
            } else {
                EventKind::Unknown
            }
        }
    })
}

fn instance_id(path: &EventPath) -> RegistryResult<i64> {
    match &path.instance {
        Some(id) => parse_instance_id(id),
        None => Err(RegistryError::InvalidState("event has no instance".to_string())),
    }
}

fn required<'a>(value: &'a Option<String>, what: &str) -> RegistryResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| RegistryError::InvalidState(format!("event has no {what}")))
}

/// Load the entity a set event refers to.
fn load_source(kind: EventKind, path: &EventPath, sp: &Snapshot) -> RegistryResult<Option<EventSource>> {
    let source = match kind {
        EventKind::AppRegister => EventSource::App(get_app(required(&path.app, "app")?, sp)?),
        EventKind::RevRegister => EventSource::Revision(get_revision(
            required(&path.app, "app")?,
            required(&path.revision, "revision")?,
            sp,
        )?),
        EventKind::ProcRegister => EventSource::Proc(get_proc(
            required(&path.app, "app")?,
            required(&path.proc, "proc")?,
            sp,
        )?),
        EventKind::EnvRegister => {
            let app = get_app(required(&path.app, "app")?, sp)?;
            EventSource::Env(get_env(&app, required(&path.env, "env")?, sp)?)
        }
        EventKind::InstanceRegister
        | EventKind::InstanceClaim
        | EventKind::InstanceUnclaim
        | EventKind::InstanceStart
        | EventKind::InstanceStop
        | EventKind::InstanceExit
        | EventKind::InstanceFail
        | EventKind::InstanceLost => EventSource::Instance(get_instance(instance_id(path)?, sp)?),
        EventKind::ServiceRegister => {
            EventSource::Service(get_service(required(&path.service, "service")?, sp)?)
        }
        EventKind::EndpointRegister => EventSource::Endpoint(get_endpoint(
            required(&path.service, "service")?,
            required(&path.endpoint, "endpoint")?,
            sp,
        )?),
        EventKind::RunnerRegister => {
            EventSource::Runner(get_runner(required(&path.runner, "runner")?, sp)?)
        }
        _ => return Ok(None),
    };
    Ok(Some(source))
}

/// Turn a raw coordinator event into a registry event.
pub fn enrich_event(raw: &RawEvent, sp: &Snapshot) -> RegistryResult<Event> {
    let sp = sp.fast_forward_to(raw.rev);
    let (kind, path) = classify(raw, &sp)?;
    let source = if raw.is_set() {
        load_source(kind, &path, &sp)?
    } else {
        None
    };
    Ok(Event {
        kind,
        body: raw.body_str(),
        path,
        source,
        rev: raw.rev,
    })
}

/// Blocking iterator over registry events after a snapshot.
///
/// By default unclassified writes are skipped; [`EventWatcher::raw`]
/// yields them as [`EventKind::Unknown`].
#[derive(Debug)]
pub struct EventWatcher {
    snapshot: Snapshot,
    rev: i64,
    raw: bool,
    timeout: Option<Duration>,
}

impl EventWatcher {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            rev: snapshot.rev(),
            snapshot,
            raw: false,
            timeout: None,
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Stop iterating when nothing happens within `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn rev(&self) -> i64 {
        self.rev
    }
}

impl Iterator for EventWatcher {
    type Item = RegistryResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.snapshot.conn().wait("/**", self.rev + 1, self.timeout) {
                Ok(Some(raw)) => raw,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.rev = raw.rev;
            match enrich_event(&raw, &self.snapshot) {
                Ok(event) if event.kind == EventKind::Unknown && !self.raw => continue,
                Ok(event) => return Some(Ok(event)),
                Err(e) => {
                    tracing::warn!(path = %raw.path, rev = raw.rev, "can't enrich event: {e}");
                    return Some(Err(e));
                }
            }
        }
    }
}

impl crate::store::Store {
    /// Watch registry events from this store's revision on.
    pub fn watch_events(&self) -> EventWatcher {
        EventWatcher::new(self.snapshot().clone())
    }
}

