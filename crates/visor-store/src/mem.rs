use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::coordinator::Coordinator;
use crate::error::StoreResult;
use crate::path::compile_glob;
use crate::tree::{RawEvent, Tree};

/// In-process coordinator. Waiters block on a condition variable that is
/// notified after every mutation. History is compacted the same way the
/// disk coordinator does it.
#[derive(Debug, Default)]
pub struct MemCoordinator {
    tree: Mutex<Tree>,
    changed: Condvar,
}

impl MemCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Coordinator for MemCoordinator {
    fn rev(&self) -> StoreResult<i64> {
        Ok(self.lock().rev())
    }

    fn get(&self, path: &str, rev: Option<i64>) -> StoreResult<(Option<Vec<u8>>, i64)> {
        self.lock().get(path, rev)
    }

    fn set(&self, path: &str, guard: i64, body: &[u8]) -> StoreResult<i64> {
        let rev = {
            let mut tree = self.lock();
            let rev = tree.set(path, guard, body)?;
            tree.trim_history();
            rev
        };
        self.changed.notify_all();
        Ok(rev)
    }

    fn del(&self, path: &str, guard: i64) -> StoreResult<()> {
        {
            let mut tree = self.lock();
            tree.del(path, guard)?;
            tree.trim_history();
        }
        self.changed.notify_all();
        Ok(())
    }

    fn stat(&self, path: &str, rev: Option<i64>) -> StoreResult<(usize, i64)> {
        self.lock().stat(path, rev)
    }

    fn getdir(&self, path: &str, rev: Option<i64>) -> StoreResult<Vec<String>> {
        self.lock().getdir(path, rev)
    }

    fn wait(
        &self,
        glob: &str,
        from_rev: i64,
        timeout: Option<Duration>,
    ) -> StoreResult<Option<RawEvent>> {
        let matcher = compile_glob(glob)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut tree = self.lock();
        loop {
            if let Some(event) = tree.first_event(&matcher, from_rev) {
                return Ok(Some(event));
            }
            tree = match deadline {
                None => self.changed.wait(tree).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.changed
                        .wait_timeout(tree, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }
}
