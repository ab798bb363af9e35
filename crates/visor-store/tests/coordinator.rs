use std::sync::Arc;
use std::thread;
use std::time::Duration;

use globset::Glob;
use tempfile::TempDir;
use visor_store::tree::{Tree, KEEP_REVS, MAX_LOG};
use visor_store::{
    dial, Coordinator, DiskCoordinator, MemCoordinator, StoreError, CLOBBER, DIR_REV, MISSING,
};

fn coordinators(tmp: &TempDir) -> Vec<Arc<dyn Coordinator>> {
    vec![
        Arc::new(MemCoordinator::new()),
        Arc::new(DiskCoordinator::open(tmp.path().join("registry.json")).unwrap()),
    ]
}

#[test]
fn set_bumps_revision_and_get_reads_back() {
    let tmp = TempDir::new().unwrap();
    for coord in coordinators(&tmp) {
        assert_eq!(coord.rev().unwrap(), 0);
        let rev = coord.set("/apps/cat/registered", 0, b"now").unwrap();
        assert_eq!(rev, 1);
        assert_eq!(coord.rev().unwrap(), 1);

        let (body, file_rev) = coord.get("/apps/cat/registered", None).unwrap();
        assert_eq!(body.as_deref(), Some(&b"now"[..]));
        assert_eq!(file_rev, 1);
    }
}

#[test]
fn missing_file_reads_as_revision_zero() {
    let coord = MemCoordinator::new();
    let (body, rev) = coord.get("/nope", None).unwrap();
    assert!(body.is_none());
    assert_eq!(rev, MISSING);
}

#[test]
fn guard_rejects_stale_writes() {
    let tmp = TempDir::new().unwrap();
    for coord in coordinators(&tmp) {
        let first = coord.set("/next-port", 0, b"8000").unwrap();
        coord.set("/next-port", first, b"8001").unwrap();

        let err = coord.set("/next-port", first, b"8002").unwrap_err();
        assert!(err.is_rev_mismatch(), "got: {err}");

        let err = coord.set("/next-port", 0, b"8002").unwrap_err();
        assert!(err.is_rev_mismatch(), "create-only guard on existing file: {err}");

        coord.set("/next-port", CLOBBER, b"9000").unwrap();
        let (body, _) = coord.get("/next-port", None).unwrap();
        assert_eq!(body.as_deref(), Some(&b"9000"[..]));
    }
}

#[test]
fn reads_at_older_revisions() {
    let coord = MemCoordinator::new();
    let r1 = coord.set("/a", 0, b"one").unwrap();
    let r2 = coord.set("/a", r1, b"two").unwrap();
    coord.del("/a", r2).unwrap();

    assert_eq!(coord.get("/a", Some(r1)).unwrap().0.as_deref(), Some(&b"one"[..]));
    assert_eq!(coord.get("/a", Some(r2)).unwrap().0.as_deref(), Some(&b"two"[..]));
    assert!(coord.get("/a", None).unwrap().0.is_none());
    assert_eq!(coord.get("/a", Some(0)).unwrap().1, MISSING);
}

#[test]
fn delete_missing_is_no_ent() {
    let tmp = TempDir::new().unwrap();
    for coord in coordinators(&tmp) {
        let err = coord.del("/ghost", CLOBBER).unwrap_err();
        assert!(err.is_no_ent(), "got: {err}");
    }
}

#[test]
fn stat_reports_files_dirs_and_missing() {
    let coord = MemCoordinator::new();
    coord.set("/apps/cat/registered", 0, b"abcd").unwrap();
    coord.set("/apps/dog/registered", 0, b"x").unwrap();

    assert_eq!(coord.stat("/apps/cat/registered", None).unwrap(), (4, 1));
    assert_eq!(coord.stat("/apps", None).unwrap(), (2, DIR_REV));
    assert_eq!(coord.stat("/apps/cow", None).unwrap(), (0, MISSING));
}

#[test]
fn getdir_lists_sorted_children() {
    let tmp = TempDir::new().unwrap();
    for coord in coordinators(&tmp) {
        coord.set("/apps/zebra/registered", 0, b"").unwrap();
        coord.set("/apps/ant/registered", 0, b"").unwrap();
        coord.set("/apps/ant/head", 0, b"v1").unwrap();

        assert_eq!(coord.getdir("/apps", None).unwrap(), vec!["ant", "zebra"]);
        assert_eq!(
            coord.getdir("/apps/ant", None).unwrap(),
            vec!["head", "registered"]
        );
        assert!(coord.getdir("/services", None).unwrap_err().is_no_ent());
    }
}

#[test]
fn getdir_at_revision_hides_later_children() {
    let coord = MemCoordinator::new();
    let rev = coord.set("/apps/a/registered", 0, b"").unwrap();
    coord.set("/apps/b/registered", 0, b"").unwrap();
    assert_eq!(coord.getdir("/apps", Some(rev)).unwrap(), vec!["a"]);
}

#[test]
fn cannot_write_over_directory() {
    let coord = MemCoordinator::new();
    coord.set("/apps/a/registered", 0, b"").unwrap();
    assert!(matches!(
        coord.set("/apps", CLOBBER, b"x"),
        Err(StoreError::IsDir(_))
    ));
}

#[test]
fn invalid_paths_are_rejected() {
    let coord = MemCoordinator::new();
    for bad in ["relative", "/trailing/", "/has space", "/under_score", ""] {
        assert!(
            matches!(coord.set(bad, CLOBBER, b""), Err(StoreError::BadPath(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn wait_returns_past_events_immediately() {
    let coord = MemCoordinator::new();
    coord.set("/instances/1/status", 0, b"pending").unwrap();
    let event = coord
        .wait("/instances/*/status", 1, Some(Duration::from_millis(10)))
        .unwrap()
        .unwrap();
    assert_eq!(event.rev, 1);
    assert_eq!(event.path, "/instances/1/status");
    assert_eq!(event.body_str(), "pending");
    assert!(event.is_set());
}

#[test]
fn wait_blocks_until_a_matching_write() {
    let coord = Arc::new(MemCoordinator::new());
    let writer = Arc::clone(&coord);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        writer.set("/other", 0, b"").unwrap();
        writer.set("/instances/7/stop", 0, b"").unwrap();
    });

    let event = coord
        .wait("/instances/*/stop", 1, Some(Duration::from_secs(5)))
        .unwrap()
        .unwrap();
    assert_eq!(event.path, "/instances/7/stop");
    handle.join().unwrap();
}

#[test]
fn wait_times_out() {
    let tmp = TempDir::new().unwrap();
    for coord in coordinators(&tmp) {
        let event = coord
            .wait("/**", 1, Some(Duration::from_millis(60)))
            .unwrap();
        assert!(event.is_none());
    }
}

#[test]
fn single_star_stays_within_a_segment() {
    let coord = MemCoordinator::new();
    coord.set("/a/b/c", 0, b"").unwrap();
    let short = Some(Duration::from_millis(10));
    assert!(coord.wait("/a/*", 1, short).unwrap().is_none());
    assert!(coord.wait("/a/**", 1, short).unwrap().is_some());
}

#[test]
fn delete_events_are_logged() {
    let coord = MemCoordinator::new();
    let rev = coord.set("/runners/host/9000", 0, b"12").unwrap();
    coord.del("/runners/host/9000", rev).unwrap();
    let event = coord
        .wait("/runners/**", rev + 1, Some(Duration::from_millis(10)))
        .unwrap()
        .unwrap();
    assert!(event.is_del());
    assert_eq!(event.rev, rev + 1);
}

#[test]
fn disk_state_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    {
        let coord = DiskCoordinator::open(&path).unwrap();
        coord.set("/apps/cat/head", 0, b"rev1").unwrap();
    }
    let coord = DiskCoordinator::open(&path).unwrap();
    assert_eq!(coord.rev().unwrap(), 1);
    let (body, _) = coord.get("/apps/cat/head", None).unwrap();
    assert_eq!(body.as_deref(), Some(&b"rev1"[..]));
    assert!(!tmp.path().join("registry.json.lock").exists());
}

#[test]
fn disk_rejects_corrupt_document() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(
        DiskCoordinator::open(&path),
        Err(StoreError::Corrupt(_))
    ));
}

#[test]
fn dial_understands_mem_and_file() {
    let tmp = TempDir::new().unwrap();
    let mem = dial("mem:").unwrap();
    assert_eq!(mem.rev().unwrap(), 0);

    let path = tmp.path().join("r.json");
    let disk = dial(&format!("file:{}", path.display())).unwrap();
    disk.set("/x", 0, b"1").unwrap();
    assert!(path.exists());

    let again = dial(&format!("file://{}", path.display())).unwrap();
    assert_eq!(again.rev().unwrap(), 1);
}

#[test]
fn dial_rejects_unknown_schemes() {
    assert!(matches!(dial("doozer:?ca=1"), Err(StoreError::BadUri(_))));
    assert!(matches!(dial("no-scheme"), Err(StoreError::BadUri(_))));
    assert!(matches!(dial("file:"), Err(StoreError::BadUri(_))));
}

#[test]
fn compaction_keeps_reads_above_horizon() {
    let mut tree = Tree::default();
    let r1 = tree.set("/a", 0, b"1").unwrap();
    let r2 = tree.set("/a", r1, b"2").unwrap();
    let r3 = tree.set("/b", 0, b"3").unwrap();
    let r4 = tree.del("/b", r3).unwrap();
    let r5 = tree.set("/a", r2, b"5").unwrap();

    tree.compact(r4);

    assert_eq!(tree.get("/a", Some(r4)).unwrap().0.as_deref(), Some(&b"2"[..]));
    assert_eq!(tree.get("/a", Some(r5)).unwrap().0.as_deref(), Some(&b"5"[..]));
    assert!(tree.get("/b", None).unwrap().0.is_none());
    assert!(matches!(
        tree.get("/a", Some(r1)),
        Err(StoreError::RevTooOld { .. })
    ));

    let all = Glob::new("/**").unwrap().compile_matcher();
    assert_eq!(tree.first_event(&all, 0).unwrap().rev, r4);
}

#[test]
fn disk_breaks_abandoned_empty_lock() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    let coord = DiskCoordinator::open(&path).unwrap();
    let lock = tmp.path().join("registry.json.lock");
    std::fs::write(&lock, b"").unwrap();
    thread::sleep(Duration::from_millis(1100));

    assert_eq!(coord.set("/a", CLOBBER, b"1").unwrap(), 1);
    assert!(!lock.exists());
}

#[test]
fn disk_breaks_lock_older_than_threshold() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    let coord = DiskCoordinator::open(&path).unwrap();
    // Held by this (live) process, but acquired long ago.
    std::fs::write(
        tmp.path().join("registry.json.lock"),
        format!("{}:1000", std::process::id()),
    )
    .unwrap();

    assert_eq!(coord.set("/a", CLOBBER, b"1").unwrap(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn disk_breaks_lock_of_dead_process() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    let coord = DiskCoordinator::open(&path).unwrap();

    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    std::fs::write(tmp.path().join("registry.json.lock"), format!("{pid}:{now}")).unwrap();

    assert_eq!(coord.set("/a", CLOBBER, b"1").unwrap(), 1);
}

#[test]
fn disk_waits_for_live_fresh_lock() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("registry.json");
    let coord = Arc::new(DiskCoordinator::open(&path).unwrap());
    let lock = tmp.path().join("registry.json.lock");
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    std::fs::write(&lock, format!("{}:{now}", std::process::id())).unwrap();

    let writer = {
        let coord = Arc::clone(&coord);
        thread::spawn(move || coord.set("/a", CLOBBER, b"1"))
    };
    thread::sleep(Duration::from_millis(200));
    assert_eq!(coord.rev().unwrap(), 0);
    std::fs::remove_file(&lock).unwrap();

    assert_eq!(writer.join().unwrap().unwrap(), 1);
}

#[test]
fn mem_compacts_long_history() {
    let coord = MemCoordinator::new();
    let total = i64::try_from(MAX_LOG).unwrap() + 1;
    let mut rev = MISSING;
    for i in 0..total {
        rev = coord.set("/counter", rev, i.to_string().as_bytes()).unwrap();
    }

    let horizon = rev - KEEP_REVS;
    assert!(matches!(
        coord.get("/counter", Some(1)),
        Err(StoreError::RevTooOld { .. })
    ));
    let (body, _) = coord.get("/counter", Some(horizon)).unwrap();
    assert_eq!(body.as_deref(), Some((horizon - 1).to_string().as_bytes()));
    let (body, _) = coord.get("/counter", None).unwrap();
    assert_eq!(body.as_deref(), Some((total - 1).to_string().as_bytes()));
}

#[test]
fn trim_history_bounds_the_log() {
    let mut tree = Tree::default();
    let mut rev = MISSING;
    for _ in 0..=MAX_LOG {
        rev = tree.set("/a", rev, b"x").unwrap();
    }
    assert!(tree.trim_history());
    assert_eq!(tree.floor(), rev - KEEP_REVS);
    assert!(tree.log_len() <= usize::try_from(KEEP_REVS).unwrap() + 1);
    assert!(!tree.trim_history());
}
