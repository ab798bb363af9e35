use std::collections::BTreeMap;

use visor_core::{RegistryError, Store};

fn store() -> Store {
    Store::dial("mem:", "/visor").unwrap().init().unwrap()
}

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_env_register_and_get() {
    let s = store();
    let app = s.new_app("envapp", "git://e.git", "s").register().unwrap();
    let env = app
        .new_env("production", vars(&[("RACK_ENV", "production"), ("WORKERS", "8")]))
        .register()
        .unwrap();
    assert!(env.registered.is_some());

    let got = app.get_env("production").unwrap();
    assert_eq!(got.vars, vars(&[("RACK_ENV", "production"), ("WORKERS", "8")]));
    assert_eq!(got.app_name, "envapp");
}

#[test]
fn test_env_register_existing_conflicts() {
    let s = store();
    let app = s.new_app("envdup", "git://e.git", "s").register().unwrap();
    app.new_env("staging", vars(&[])).register().unwrap();
    let err = app.new_env("staging", vars(&[("A", "b")])).register().unwrap_err();
    assert!(err.is_conflict(), "got {err:?}");
}

#[test]
fn test_env_rejects_empty_and_equals_keys() {
    let s = store();
    let app = s.new_app("envkeys", "git://e.git", "s").register().unwrap();
    let err = app.new_env("a", vars(&[("", "x")])).register().unwrap_err();
    assert!(matches!(err, RegistryError::InvalidKey(_)));
    let err = app.new_env("b", vars(&[("K=V", "x")])).register().unwrap_err();
    assert!(matches!(err, RegistryError::InvalidKey(_)));
}

#[test]
fn test_env_rejects_references_that_are_not_one_segment() {
    let s = store();
    let app = s.new_app("envrefs", "git://e.git", "s").register().unwrap();
    for reference in ["", "a/b", "../up", "-lead"] {
        let err = app.new_env(reference, vars(&[("X", "1")])).register().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidKey(_)), "{reference}: {err:?}");
    }
    assert!(app.get_envs().unwrap().is_empty());
}

#[test]
fn test_env_unregister() {
    let s = store();
    let app = s.new_app("envgone", "git://e.git", "s").register().unwrap();
    let env = app.new_env("dev", vars(&[("X", "1")])).register().unwrap();
    env.unregister().unwrap();
    assert!(app.get_env("dev").unwrap_err().is_not_found());
    assert!(env.unregister().unwrap_err().is_not_found());
}

#[test]
fn test_get_envs() {
    let s = store();
    let app = s.new_app("envlist", "git://e.git", "s").register().unwrap();
    app.new_env("one", vars(&[])).register().unwrap();
    app.new_env("two", vars(&[])).register().unwrap();
    let refs: Vec<String> = app.get_envs().unwrap().into_iter().map(|e| e.reference).collect();
    assert_eq!(refs, vec!["one", "two"]);
}
