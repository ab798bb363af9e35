use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A file-backed registry in a scratch directory, with `HOME` pointed there
/// so no user config leaks in.
struct Registry {
    dir: TempDir,
}

impl Registry {
    fn new() -> Self {
        let registry = Self {
            dir: TempDir::new().unwrap(),
        };
        registry.visor().arg("init").assert().success();
        registry
    }

    fn uri(&self) -> String {
        format!("file:{}", self.dir.path().join("registry.json").display())
    }

    #[allow(deprecated)]
    fn visor(&self) -> Command {
        let mut cmd = Command::cargo_bin("visor").unwrap();
        cmd.env("HOME", self.dir.path())
            .env_remove("VISOR_URI")
            .env_remove("VISOR_ROOT")
            .args(["--uri", &self.uri()]);
        cmd
    }

    fn run(&self, args: &[&str]) -> String {
        let out = self.visor().args(args).assert().success();
        String::from_utf8_lossy(&out.get_output().stdout).into_owned()
    }

    /// App `rocket` with revision `abc123` and proc `web`.
    fn with_app(self) -> Self {
        self.run(&["app", "register", "rocket", "--repo", "git://rocket.git", "--stack", "ruby"]);
        self.run(&[
            "revision",
            "register",
            "rocket",
            "abc123",
            "--archive-url",
            "http://archives/rocket-abc123.tar.gz",
        ]);
        self.run(&["proc", "register", "rocket", "web"]);
        self
    }
}

#[test]
fn test_init_is_idempotent() {
    let reg = Registry::new();
    reg.visor()
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("schema version 1"));
}

#[test]
fn test_uninitialized_registry_is_rejected() {
    let dir = TempDir::new().unwrap();
    #[allow(deprecated)]
    Command::cargo_bin("visor")
        .unwrap()
        .env("HOME", dir.path())
        .args(["--uri", &format!("file:{}/r.json", dir.path().display())])
        .args(["app", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("schema mismatch"));
}

#[test]
fn test_app_register_list_describe() {
    let reg = Registry::new();
    reg.visor()
        .args(["app", "register", "rocket", "--repo", "git://rocket.git", "--stack", "ruby"])
        .assert()
        .success()
        .stderr(predicate::str::contains("app rocket (lxc)"));

    assert_eq!(reg.run(&["app", "list"]), "rocket\n");

    reg.visor()
        .args(["app", "describe", "rocket"])
        .assert()
        .success()
        .stdout(predicate::str::contains("repo-url:    git://rocket.git"))
        .stdout(predicate::str::contains("deploy-type: lxc"))
        .stdout(predicate::str::contains("head:        -"));
}

#[test]
fn test_app_register_rejects_duplicates_and_bad_names() {
    let reg = Registry::new().with_app();
    reg.visor()
        .args(["app", "register", "rocket", "--repo", "r", "--stack", "s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already registered"));
    reg.visor()
        .args(["app", "register", "no_underscores", "--repo", "r", "--stack", "s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid name"));
}

#[test]
fn test_app_unregister() {
    let reg = Registry::new().with_app();
    reg.run(&["app", "unregister", "rocket"]);
    assert_eq!(reg.run(&["app", "list"]), "");
    reg.visor()
        .args(["app", "describe", "rocket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_app_environment_vars() {
    let reg = Registry::new().with_app();
    reg.run(&["app", "setenv", "rocket", "RAILS_ENV", "production"]);
    reg.run(&["app", "setenv", "rocket", "WORKERS", "4"]);

    assert_eq!(
        reg.run(&["app", "env", "rocket"]),
        "RAILS_ENV=production\nWORKERS=4\n"
    );
    assert_eq!(reg.run(&["app", "getenv", "rocket", "RAILS_ENV"]), "production\n");

    reg.run(&["app", "delenv", "rocket", "RAILS_ENV"]);
    reg.visor()
        .args(["app", "getenv", "rocket", "RAILS_ENV"])
        .assert()
        .failure();
}

#[test]
fn test_revision_exists_exit_status() {
    let reg = Registry::new().with_app();
    reg.visor()
        .args(["revision", "exists", "rocket", "abc123"])
        .assert()
        .success();
    reg.visor()
        .args(["revision", "exists", "rocket", "fff000"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_revision_describe_and_head() {
    let reg = Registry::new().with_app();
    reg.visor()
        .args(["rev", "describe", "rocket", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "archive-url: http://archives/rocket-abc123.tar.gz",
        ));

    reg.visor()
        .args(["app", "head", "rocket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no head revision"));
    reg.run(&["app", "head", "rocket", "abc123"]);
    assert_eq!(reg.run(&["app", "head", "rocket"]), "abc123\n");
    assert_eq!(reg.run(&["app", "revisions", "rocket"]), "abc123\n");

    reg.visor()
        .args(["app", "head", "rocket", "unknown"])
        .assert()
        .failure();
}

#[test]
fn test_proc_register_claims_ports() {
    let reg = Registry::new().with_app();
    reg.visor()
        .args(["proc", "register", "rocket", "worker", "--memory-limit-mb", "512"])
        .assert()
        .success()
        .stderr(predicate::str::contains("on port 8001"));

    reg.visor()
        .args(["proc", "describe", "rocket", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port:        8000"));
    reg.visor()
        .args(["proc", "describe", "rocket", "worker"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory-mb:   512"));

    reg.visor()
        .args(["proc", "register", "rocket", "bad-name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid proc name"));
}

#[test]
fn test_scale_up_and_down() {
    let reg = Registry::new().with_app();
    let ids = reg.run(&["scale", "rocket", "abc123", "web", "3"]);
    let ids: Vec<i64> = ids.lines().map(|l| l.parse().unwrap()).collect();
    assert_eq!(ids.len(), 3);

    let listed = reg.run(&["revision", "instances", "rocket", "abc123"]);
    assert_eq!(listed.lines().count(), 3);
    assert!(listed.lines().all(|l| l.contains("pending")));

    reg.visor()
        .args(["scale", "rocket", "abc123", "web", "1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("from 3 to 1"));

    reg.visor()
        .args(["scale", "rocket", "abc123", "web", "1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Unchanged"));

    reg.visor()
        .args(["scale", "rocket", "abc123", "web", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("negative"));

    reg.visor()
        .args(["scale", "rocket", "nope", "web", "1"])
        .assert()
        .failure();
}

#[test]
fn test_instance_describe_and_stop() {
    let reg = Registry::new().with_app();
    let id = reg.run(&["scale", "rocket", "abc123", "web", "1", "--env", "staging"]);
    let id = id.trim();

    reg.visor()
        .args(["instance", "describe", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("proc:        web"))
        .stdout(predicate::str::contains("env:         staging"))
        .stdout(predicate::str::contains("status:      pending"))
        .stdout(predicate::str::contains("stop:").not());

    assert_eq!(reg.run(&["instance", "claims", id]), "");

    reg.run(&["instance", "stop", id]);
    reg.visor()
        .args(["instance", "describe", id])
        .assert()
        .success()
        .stdout(predicate::str::contains("stop:        requested"));

    assert_eq!(reg.run(&["app", "instances", "rocket"]).lines().count(), 1);
}

#[test]
fn test_services_and_endpoints() {
    let reg = Registry::new();
    reg.run(&["service", "register", "db"]);
    reg.visor()
        .args(["service", "register", "db"])
        .assert()
        .failure();
    reg.run(&["endpoint", "register", "db", "127.0.0.1", "5432", "--priority", "1"]);

    assert_eq!(reg.run(&["service", "list"]), "db\n");
    reg.visor()
        .args(["service", "describe", "db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("127-0-0-1-5432 127.0.0.1:5432 priority=1"));

    reg.run(&["endpoint", "unregister", "db", "127.0.0.1", "5432"]);
    reg.visor()
        .args(["service", "describe", "db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("endpoint:").not());

    reg.run(&["service", "unregister", "db"]);
    assert_eq!(reg.run(&["service", "list"]), "");
}

#[test]
fn test_runner_list_empty() {
    let reg = Registry::new();
    assert_eq!(reg.run(&["runner", "list"]), "");
    assert_eq!(reg.run(&["runner", "list", "--host", "10.0.0.1"]), "");
}

#[test]
fn test_watch_replays_events_since_revision() {
    let reg = Registry::new().with_app();
    reg.visor()
        .args(["watch", "--since", "0", "--timeout", "1"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("app-register"))
        .stdout(predicate::str::contains("rev-register"))
        .stdout(predicate::str::contains("proc-register"));
}

#[test]
fn test_root_isolates_registries() {
    let reg = Registry::new().with_app();
    reg.visor().args(["--root", "/other", "init"]).assert().success();
    assert_eq!(reg.run(&["--root", "/other", "app", "list"]), "");
    assert_eq!(reg.run(&["app", "list"]), "rocket\n");
}
