//! `visor watch`: print registry events until Ctrl-C.
//!
//! The event watcher blocks, so it runs on the blocking pool and hands
//! formatted lines back over a channel. It wakes up every [`POLL`] to see
//! whether it was asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use miette::Result;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use visor_core::{EventWatcher, RegistryError, RegistryResult};
use visor_store::Snapshot;
use visor_util::errors::VisorError;

use crate::cli::CoordinatorArgs;

const POLL: Duration = Duration::from_millis(500);

pub async fn exec(
    args: &CoordinatorArgs,
    raw: bool,
    since: Option<i64>,
    timeout: Option<u64>,
) -> Result<()> {
    let store = super::connect(args)?;
    let start = match since {
        Some(rev) => Snapshot::new(rev, store.snapshot().conn().clone()),
        None => store.snapshot().clone(),
    };
    let idle = timeout.map(Duration::from_secs);
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = unbounded_channel();

    let worker = tokio::task::spawn_blocking({
        let stop = Arc::clone(&stop);
        move || watch_loop(start, raw, idle, &stop, &tx)
    });

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => println!("{line}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted, stopping watcher");
                stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    worker.await.map_err(|e| VisorError::Generic {
        message: format!("event watcher failed: {e}"),
    })??;
    Ok(())
}

fn watch_loop(
    mut sp: Snapshot,
    raw: bool,
    idle: Option<Duration>,
    stop: &AtomicBool,
    tx: &UnboundedSender<String>,
) -> RegistryResult<()> {
    let mut last = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let mut watcher = EventWatcher::new(sp.clone()).timeout(POLL);
        if raw {
            watcher = watcher.raw();
        }
        for event in watcher.by_ref() {
            match event {
                Ok(event) => {
                    if tx.send(event.to_string()).is_err() {
                        return Ok(());
                    }
                    last = Instant::now();
                }
                // Coordinator failures end the watch; the watcher already
                // logged anything it couldn't enrich.
                Err(e @ RegistryError::Store(_)) => return Err(e),
                Err(_) => {}
            }
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }
        }
        sp = sp.fast_forward_to(EventWatcher::rev(&watcher));
        if idle.is_some_and(|d| last.elapsed() >= d) {
            break;
        }
    }
    Ok(())
}
