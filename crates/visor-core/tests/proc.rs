use visor_core::store::START_PORT;
use visor_core::{ProcAttrs, RegistryError, ResourceLimits, Store};

fn store() -> Store {
    Store::dial("mem:", "/visor").unwrap().init().unwrap()
}

#[test]
fn test_proc_register_claims_port() {
    let s = store();
    let app = s.new_app("procapp", "git://p.git", "s").register().unwrap();
    let web = s.new_proc(&app, "web").register().unwrap();
    let worker = s.new_proc(&app, "worker").register().unwrap();
    assert_eq!(web.port, START_PORT);
    assert_eq!(worker.port, START_PORT + 1);

    let got = app.get_proc("web").unwrap();
    assert_eq!(got.port, START_PORT);
    assert!(got.registered.is_some());
}

#[test]
fn test_proc_register_twice_conflicts() {
    let s = store();
    let app = s.new_app("procdup", "git://p.git", "s").register().unwrap();
    s.new_proc(&app, "web").register().unwrap();
    let err = s.new_proc(&app, "web").register().unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");
}

#[test]
fn test_proc_rejects_bad_names() {
    let s = store();
    let app = s.new_app("procname", "git://p.git", "s").register().unwrap();
    for name in ["web-1", "web_1", ""] {
        let err = s.new_proc(&app, name).register().unwrap_err();
        assert!(matches!(err, RegistryError::BadProcName(_)), "{name}: {err:?}");
    }
}

#[test]
fn test_proc_unregister() {
    let s = store();
    let app = s.new_app("procgone", "git://p.git", "s").register().unwrap();
    let proc = s.new_proc(&app, "web").register().unwrap();
    proc.unregister().unwrap();
    assert!(app.get_proc("web").unwrap_err().is_not_found());
    assert!(proc.unregister().unwrap_err().is_not_found());
}

#[test]
fn test_get_procs() {
    let s = store();
    let app = s.new_app("proclist", "git://p.git", "s").register().unwrap();
    s.new_proc(&app, "web").register().unwrap();
    s.new_proc(&app, "clock").register().unwrap();
    let names: Vec<String> = app.get_procs().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["clock", "web"]);
}

#[test]
fn test_proc_store_attrs() {
    let s = store();
    let app = s.new_app("procattrs", "git://p.git", "s").register().unwrap();
    let mut proc = s.new_proc(&app, "web").register().unwrap();
    assert_eq!(proc.attrs, ProcAttrs::default());

    proc.attrs.limits = ResourceLimits {
        memory_limit_mb: Some(512),
    };
    proc.store_attrs().unwrap();

    let got = app.get_proc("web").unwrap();
    assert_eq!(got.attrs.limits.memory_limit_mb, Some(512));
}

#[test]
fn test_proc_instance_bookkeeping() {
    let s = store();
    let app = s.new_app("procins", "git://p.git", "s").register().unwrap();
    let proc = s.new_proc(&app, "web").register().unwrap();

    let a = s.register_instance("procins", "v1", "web", "default").unwrap();
    let b = s.register_instance("procins", "v2", "web", "default").unwrap();
    let c = s.register_instance("procins", "v2", "web", "default").unwrap();

    assert_eq!(proc.num_instances().unwrap(), 3);
    assert_eq!(proc.get_running_revs().unwrap(), vec!["v1", "v2"]);
    let ids: Vec<i64> = proc.get_instances().unwrap().iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);

    let b = b.claim("10.0.0.1").unwrap();
    b.failed("10.0.0.1", "segfault").unwrap();
    c.lost("watchman", "host down").unwrap();

    assert_eq!(proc.num_instances().unwrap(), 1);
    let failed: Vec<i64> = proc.get_failed_instances().unwrap().iter().map(|i| i.id).collect();
    let lost: Vec<i64> = proc.get_lost_instances().unwrap().iter().map(|i| i.id).collect();
    assert_eq!(failed, vec![b.id]);
    assert_eq!(lost, vec![c.id]);
}
