use std::sync::Arc;
use std::time::Duration;

use visor_core::{
    get_schema_version, set_schema_version, verify_schema_version, watch_schema, RegistryError,
    Store, SCHEMA_VERSION,
};
use visor_store::{Conn, MemCoordinator, Snapshot};

fn snapshot() -> Snapshot {
    Snapshot::latest(Conn::new(Arc::new(MemCoordinator::new()), "/visor")).unwrap()
}

#[test]
fn test_verify_without_version_is_mismatch() {
    let err = verify_schema_version(&snapshot(), SCHEMA_VERSION).unwrap_err();
    assert!(
        matches!(err, RegistryError::SchemaMismatch { found: None, .. }),
        "got {err:?}"
    );
}

#[test]
fn test_init_writes_current_version() {
    let s = Store::new(snapshot()).init().unwrap();
    assert_eq!(get_schema_version(s.snapshot()).unwrap(), Some(SCHEMA_VERSION));
    verify_schema_version(s.snapshot(), SCHEMA_VERSION).unwrap();
}

#[test]
fn test_verify_detects_older_and_newer_coordinators() {
    let sp = snapshot();
    let sp = set_schema_version(&sp, 3).unwrap();
    for client in [2, 4] {
        let err = verify_schema_version(&sp, client).unwrap_err();
        assert!(
            matches!(err, RegistryError::SchemaMismatch { expected, found: Some(3) } if expected == client),
            "got {err:?}"
        );
    }
}

#[test]
fn test_watch_schema_yields_updates() {
    let sp = set_schema_version(&snapshot(), 2).unwrap();
    let watch = watch_schema(&sp).timeout(Duration::from_millis(200));
    set_schema_version(&sp, 3).unwrap();
    set_schema_version(&sp, 4).unwrap();
    let versions: Vec<i64> = watch.map(|v| v.unwrap()).collect();
    assert_eq!(versions, vec![3, 4]);
}
