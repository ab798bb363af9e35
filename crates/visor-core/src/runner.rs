//! Runners: the supervisor processes that keep an instance alive on a host.
//!
//! The registry records which instance each runner supervises under
//! `/runners/<host>/<port>`. [`RunnerClient`] talks to a runner's control
//! port directly.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use visor_store::{get_snapshotables, Dir, ListCodec, Snapshot, StoreError};

use crate::error::{RegistryError, RegistryResult};
use crate::instance::parse_instance_id;
use crate::store::{getdir_or_empty, Store};

pub const RUNNERS_PATH: &str = "/runners";

const DIAL_ATTEMPTS: usize = 3;
const DIAL_BACKOFF: Duration = Duration::from_millis(500);
const IO_DEADLINE: Duration = Duration::from_secs(1);

/// A registered runner, addressed as `host:port`.
#[derive(Debug, Clone)]
pub struct Runner {
    dir: Dir,
    pub addr: String,
    pub instance_id: i64,
}

fn split_addr(addr: &str) -> RegistryResult<(&str, &str)> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok((host, port)),
        _ => Err(RegistryError::InvalidArgument(format!(
            "runner address \"{addr}\" must be host:port"
        ))),
    }
}

fn runner_path(addr: &str) -> RegistryResult<String> {
    let (host, port) = split_addr(addr)?;
    Ok(format!("{RUNNERS_PATH}/{host}/{port}"))
}

/// `host:port` from `/runners/<host>/<port>`.
fn addr_from_path(path: &str) -> Option<String> {
    let mut parts = path.trim_start_matches('/').split('/').skip(1);
    match (parts.next(), parts.next()) {
        (Some(host), Some(port)) => Some(format!("{host}:{port}")),
        _ => None,
    }
}

impl Store {
    pub fn new_runner(&self, addr: &str, instance_id: i64) -> RegistryResult<Runner> {
        Ok(Runner {
            dir: Dir::new(self.snapshot().clone(), &runner_path(addr)?),
            addr: addr.to_string(),
            instance_id,
        })
    }

    pub fn get_runner(&self, addr: &str) -> RegistryResult<Runner> {
        get_runner(addr, &self.snapshot().fast_forward()?)
    }

    pub fn get_runners(&self) -> RegistryResult<Vec<Runner>> {
        let sp = self.snapshot().fast_forward()?;
        let mut runners = Vec::new();
        for host in getdir_or_empty(&sp, RUNNERS_PATH)? {
            runners.extend(runners_by_host(&host, &sp)?);
        }
        Ok(runners)
    }

    pub fn runners_by_host(&self, host: &str) -> RegistryResult<Vec<Runner>> {
        runners_by_host(host, &self.snapshot().fast_forward()?)
    }

    /// Blocking iterator over runners registered on `host`.
    pub fn watch_runner_start(&self, host: &str) -> RunnerWatch {
        RunnerWatch::new(self.snapshot().clone(), host, true)
    }

    /// Blocking iterator over runners unregistered from `host`.
    pub fn watch_runner_stop(&self, host: &str) -> RunnerWatch {
        RunnerWatch::new(self.snapshot().clone(), host, false)
    }
}

fn runners_by_host(host: &str, sp: &Snapshot) -> RegistryResult<Vec<Runner>> {
    let ports = getdir_or_empty(sp, &format!("{RUNNERS_PATH}/{host}"))?;
    get_snapshotables(&ports, |port| get_runner(&format!("{host}:{port}"), sp))
}

pub(crate) fn get_runner(addr: &str, sp: &Snapshot) -> RegistryResult<Runner> {
    let path = runner_path(addr)?;
    let fields = match sp.get_file(&path, ListCodec) {
        Ok(f) => f.value,
        Err(StoreError::NoEnt { .. }) => {
            return Err(RegistryError::NotFound(format!("runner {addr} not found")))
        }
        Err(e) => return Err(e.into()),
    };
    let id = fields.first().ok_or_else(|| {
        RegistryError::InvalidState(format!("runner {addr} has no instance id"))
    })?;
    Ok(Runner {
        dir: Dir::new(sp.clone(), &path),
        addr: addr.to_string(),
        instance_id: parse_instance_id(id)?,
    })
}

impl Runner {
    pub fn snapshot(&self) -> &Snapshot {
        &self.dir.snapshot
    }

    pub fn register(&self) -> RegistryResult<Self> {
        let sp = self.dir.snapshot.fast_forward()?;
        let sp = sp.set(self.dir.name(), &self.instance_id.to_string())?;
        Ok(Self {
            dir: self.dir.join(sp),
            ..self.clone()
        })
    }

    pub fn unregister(&self) -> RegistryResult<()> {
        let sp = self.dir.snapshot.fast_forward()?;
        Ok(sp.del(self.dir.name())?)
    }

    /// A control client for this runner over TCP.
    pub fn client(&self) -> RunnerClient<TcpNetwork> {
        RunnerClient::new(&self.addr, TcpNetwork)
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runner<{}>{{instance: {}}}", self.addr, self.instance_id)
    }
}

/// Blocking iterator over runner registrations or removals on one host.
#[derive(Debug)]
pub struct RunnerWatch {
    snapshot: Snapshot,
    glob: String,
    rev: i64,
    starts: bool,
    timeout: Option<Duration>,
}

/// What a [`RunnerWatch`] yields.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Started(Runner),
    Stopped(String),
}

impl RunnerWatch {
    fn new(snapshot: Snapshot, host: &str, starts: bool) -> Self {
        Self {
            glob: format!("{RUNNERS_PATH}/{host}/*"),
            rev: snapshot.rev(),
            snapshot,
            starts,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Iterator for RunnerWatch {
    type Item = RegistryResult<RunnerEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.snapshot.conn().wait(&self.glob, self.rev + 1, self.timeout) {
                Ok(Some(event)) => event,
                Ok(None) => return None,
                Err(e) => return Some(Err(e.into())),
            };
            self.rev = event.rev;
            if event.is_set() != self.starts {
                continue;
            }
            let Some(addr) = addr_from_path(&event.path) else {
                continue;
            };
            if !self.starts {
                return Some(Ok(RunnerEvent::Stopped(addr)));
            }
            let sp = self.snapshot.fast_forward_to(event.rev);
            return Some(get_runner(&addr, &sp).map(RunnerEvent::Started));
        }
    }
}

/// How [`RunnerClient`] reaches a runner.
pub trait Network {
    type Stream: Read + Write;

    fn dial(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// Plain TCP with one-second connect, read and write deadlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpNetwork;

impl Network for TcpNetwork {
    type Stream = TcpStream;

    fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        let mut last = io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses");
        for sa in addrs {
            match TcpStream::connect_timeout(&sa, IO_DEADLINE) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(IO_DEADLINE))?;
                    stream.set_write_timeout(Some(IO_DEADLINE))?;
                    return Ok(stream);
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

/// Status line reported by a runner, e.g. `up 6 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerStatus {
    pub up: bool,
    pub service_restarts: u32,
    pub log_restarts: u32,
}

/// Line protocol client for a runner's control port.
///
/// The connection is switched into `raw` mode on connect, after which each
/// command gets a single line in reply (`kill` gets none).
pub struct RunnerClient<N: Network> {
    addr: String,
    network: N,
    conn: Option<BufReader<N::Stream>>,
}

impl<N: Network> fmt::Debug for RunnerClient<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerClient")
            .field("addr", &self.addr)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl<N: Network> RunnerClient<N> {
    pub fn new(addr: &str, network: N) -> Self {
        Self {
            addr: addr.to_string(),
            network,
            conn: None,
        }
    }

    fn err(&self, message: impl Into<String>) -> RegistryError {
        RegistryError::Runner {
            addr: self.addr.clone(),
            message: message.into(),
        }
    }

    pub fn connect(&mut self) -> RegistryResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let mut last = String::new();
        for attempt in 1..=DIAL_ATTEMPTS {
            match self.network.dial(&self.addr) {
                Ok(stream) => {
                    self.conn = Some(BufReader::new(stream));
                    self.cmd("raw")?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(addr = %self.addr, attempt, "runner dial failed: {e}");
                    last = e.to_string();
                }
            }
            if attempt < DIAL_ATTEMPTS {
                thread::sleep(DIAL_BACKOFF);
            }
        }
        Err(self.err(format!("can't connect: {last}")))
    }

    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    fn send(&mut self, cmd: &str) -> RegistryResult<()> {
        let addr = self.addr.clone();
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| RegistryError::Runner {
                addr: addr.clone(),
                message: "not connected".to_string(),
            })?;
        writeln!(conn.get_mut(), "{cmd}")
            .and_then(|_| conn.get_mut().flush())
            .map_err(|e| RegistryError::Runner {
                addr,
                message: format!("{cmd}: {e}"),
            })
    }

    fn cmd(&mut self, cmd: &str) -> RegistryResult<String> {
        self.send(cmd)?;
        let mut line = String::new();
        let read = match self.conn.as_mut() {
            Some(conn) => conn.read_line(&mut line),
            None => return Err(self.err("not connected")),
        };
        match read {
            Ok(0) => Err(self.err(format!("{cmd}: connection closed"))),
            Ok(_) => Ok(line),
            Err(e) => Err(self.err(format!("{cmd}: {e}"))),
        }
    }

    pub fn pid(&mut self) -> RegistryResult<u32> {
        let out = self.cmd("pid")?;
        out.trim()
            .parse()
            .map_err(|_| self.err(format!("bad pid \"{}\"", out.trim())))
    }

    pub fn status(&mut self) -> RegistryResult<RunnerStatus> {
        let out = self.cmd("status")?;
        let fields: Vec<&str> = out.split_whitespace().collect();
        let bad = || self.err(format!("bad status \"{}\"", out.trim()));
        let [state, srv, log] = fields.as_slice() else {
            return Err(bad());
        };
        let up = match *state {
            "up" => true,
            "down" => false,
            _ => return Err(bad()),
        };
        Ok(RunnerStatus {
            up,
            service_restarts: srv.parse().map_err(|_| bad())?,
            log_restarts: log.parse().map_err(|_| bad())?,
        })
    }

    /// Ask the runner to exit. There is no reply.
    pub fn kill(&mut self) -> RegistryResult<()> {
        self.send("kill")
    }

    /// Take the supervised service down.
    pub fn down(&mut self) -> RegistryResult<()> {
        let out = self.cmd("down")?;
        if out.trim() == "OK" {
            Ok(())
        } else {
            Err(self.err(format!("down: {}", out.trim())))
        }
    }
}
