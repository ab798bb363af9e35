use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use visor_util::fs::write_atomic;

use crate::coordinator::Coordinator;
use crate::error::{StoreError, StoreResult};
use crate::path::compile_glob;
use crate::tree::{RawEvent, Tree};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// A lock held this long belongs to a crashed process.
const STALE_LOCK: Duration = Duration::from_secs(30);
/// Holders write their metadata right after creating the lock; an empty
/// lock older than this was abandoned mid-create.
const EMPTY_LOCK_GRACE: Duration = Duration::from_secs(1);

/// Coordinator persisted as a single JSON document.
///
/// Mutations take an exclusive lock file next to the document, load the
/// tree, apply the change and atomically replace the file. Reads load the
/// latest document without locking. `wait` polls.
#[derive(Debug)]
pub struct DiskCoordinator {
    path: PathBuf,
    local: Mutex<()>,
}

/// Removes the lock file when dropped.
///
/// The file holds `pid:acquired_at` so that a lock left behind by a dead
/// process can be broken.
struct LockFile {
    path: PathBuf,
}

/// What a lock file says about its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockHolder {
    pid: u32,
    acquired_at: u64,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: unix_now(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let (pid, acquired_at) = s.trim().split_once(':')?;
        Some(Self {
            pid: pid.parse().ok()?,
            acquired_at: acquired_at.parse().ok()?,
        })
    }

    fn age(&self) -> Duration {
        Duration::from_secs(unix_now().saturating_sub(self.acquired_at))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl LockFile {
    fn acquire(path: PathBuf) -> StoreResult<Self> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let holder = LockHolder::current();
                    let lock = Self { path };
                    write!(file, "{}:{}", holder.pid, holder.acquired_at)?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::break_if_stale(&path)? {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout(path.display().to_string()));
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove the lock at `path` when its holder is gone. Returns whether
    /// the caller should retry right away.
    fn break_if_stale(path: &Path) -> StoreResult<bool> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let stale = match LockHolder::parse(&contents) {
            Some(holder) => {
                let age = holder.age();
                let dead = !process_alive(holder.pid);
                if dead || age > STALE_LOCK {
                    tracing::warn!(
                        holder_pid = holder.pid,
                        age_secs = age.as_secs(),
                        dead,
                        "breaking stale lock {}",
                        path.display()
                    );
                    true
                } else {
                    false
                }
            }
            None => {
                let age = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.elapsed().ok())
                    .unwrap_or_default();
                if age > EMPTY_LOCK_GRACE {
                    tracing::warn!(
                        age_secs = age.as_secs(),
                        "breaking unreadable lock {}",
                        path.display()
                    );
                    true
                } else {
                    false
                }
            }
        };
        // Another process may have broken and retaken it since we read it.
        if stale && fs::read_to_string(path).ok().as_deref() == Some(contents.as_str()) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stale)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl DiskCoordinator {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let coord = Self {
            path,
            local: Mutex::new(()),
        };
        // Surface unreadable documents at dial time rather than on first use.
        coord.load()?;
        Ok(coord)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn load(&self) -> StoreResult<Tree> {
        match fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                StoreError::Corrupt(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Tree::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, tree: &mut Tree) -> StoreResult<()> {
        if tree.trim_history() {
            tracing::debug!("compacted {} below rev {}", self.path.display(), tree.floor());
        }
        let data = serde_json::to_vec_pretty(tree)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        write_atomic(&self.path, &data)?;
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Tree) -> StoreResult<T>) -> StoreResult<T> {
        let _local = self.local.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            visor_util::fs::ensure_dir(parent)?;
        }
        let _lock = LockFile::acquire(self.lock_path())?;
        let mut tree = self.load()?;
        let out = f(&mut tree)?;
        self.save(&mut tree)?;
        Ok(out)
    }
}

impl Coordinator for DiskCoordinator {
    fn rev(&self) -> StoreResult<i64> {
        Ok(self.load()?.rev())
    }

    fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(Option<Vec<u8>>, i64)> {
        self.load()?.get(path, rev)
    }

    fn set(&self, path: &str, guard: i64, body: &[u8]) -> StoreResult<i64> {
        self.mutate(|tree| tree.set(path, guard, body))
    }

    fn del(&self, path: &str, guard: i64) -> StoreResult<()> {
        self.mutate(|tree| tree.del(path, guard)).map(|_| ())
    }

    fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<(usize, i64)> {
        self.load()?.stat(path, rev)
    }

    fn getdir(&self, path: &str, rev: Option<i64>) -> StoreResult<Vec<String>> {
        self.load()?.getdir(path, rev)
    }

    fn wait(
        &self,
        glob: &str,
        from_rev: i64,
        timeout: Option<Duration>,
    ) -> StoreResult<Option<RawEvent>> {
        let matcher = compile_glob(glob)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(event) = self.load()?.first_event(&matcher, from_rev) {
                return Ok(Some(event));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
