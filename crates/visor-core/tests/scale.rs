use visor_core::{InsStatus, RegistryError, Store};

fn setup() -> Store {
    let s = Store::dial("mem:", "/visor").unwrap().init().unwrap();
    let app = s.new_app("scaly", "git://s.git", "s").register().unwrap();
    s.new_revision(&app, "v1", "http://a/v1").register().unwrap();
    s.new_proc(&app, "web").register().unwrap();
    s
}

#[test]
fn test_scale_up_registers_instances() {
    let s = setup();
    let change = s.scale("scaly", "v1", "web", "default", 3).unwrap();
    assert_eq!(change.previous, 0);
    assert_eq!(change.current, 3);
    assert_eq!(change.instances.len(), 3);
    assert!(change.instances.iter().all(|i| i.status == InsStatus::Pending));
    assert_eq!(s.get_scale("scaly", "v1", "web").unwrap().0, 3);
}

#[test]
fn test_scale_down_stops_newest() {
    let s = setup();
    let up = s.scale("scaly", "v1", "web", "default", 3).unwrap();
    let down = s.scale("scaly", "v1", "web", "default", 1).unwrap();

    assert_eq!(down.previous, 3);
    assert_eq!(down.current, 1);
    let stopped: Vec<i64> = down.instances.iter().map(|i| i.id).collect();
    assert_eq!(stopped, vec![up.instances[2].id, up.instances[1].id]);
    assert!(down.instances.iter().all(|i| i.stop_requested));
    assert_eq!(s.get_scale("scaly", "v1", "web").unwrap().0, 1);
}

#[test]
fn test_scale_same_factor_is_noop() {
    let s = setup();
    s.scale("scaly", "v1", "web", "default", 2).unwrap();
    let change = s.scale("scaly", "v1", "web", "default", 2).unwrap();
    assert!(change.instances.is_empty());
}

#[test]
fn test_scale_rejects_negative_factor() {
    let err = setup().scale("scaly", "v1", "web", "default", -1).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)), "got {err:?}");
}

#[test]
fn test_scale_requires_revision_and_proc() {
    let s = setup();
    assert!(s.scale("scaly", "v9", "web", "default", 1).unwrap_err().is_not_found());
    assert!(s.scale("scaly", "v1", "clock", "default", 1).unwrap_err().is_not_found());
}
