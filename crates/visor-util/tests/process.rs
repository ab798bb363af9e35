use visor_util::process::CommandBuilder;

#[cfg(unix)]
#[test]
fn test_builder_simple_command() {
    let output = CommandBuilder::new("echo").arg("hello").exec().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "hello");
}

#[cfg(unix)]
#[test]
fn test_builder_with_env() {
    let output = CommandBuilder::new("sh")
        .arg("-c")
        .arg("echo $GOPATH:$GOBIN")
        .envs([("GOPATH", "/tmp/build"), ("GOBIN", "/opt/visor/bin")])
        .exec()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "/tmp/build:/opt/visor/bin");
}

#[cfg(unix)]
#[test]
fn test_builder_with_cwd() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("Makefile"), "all:\n").unwrap();

    let output = CommandBuilder::new("ls")
        .arg("Makefile")
        .cwd(tmp.path())
        .exec()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Makefile"));
}

#[test]
fn test_builder_nonexistent_program() {
    let result = CommandBuilder::new("nonexistent_program_xyz_123").exec();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("nonexistent_program_xyz_123"));
}

#[test]
fn test_display_joins_program_and_args() {
    let cmd = CommandBuilder::new("make").args(["gobuild", "install"]);
    assert_eq!(cmd.display(), "make gobuild install");
}

#[test]
fn test_get_env_reports_configured_value() {
    let cmd = CommandBuilder::new("make").env("GOBIN", "/usr/local/bin");
    assert_eq!(cmd.get_env("GOBIN"), Some("/usr/local/bin"));
    assert_eq!(cmd.get_env("GOPATH"), None);
}
