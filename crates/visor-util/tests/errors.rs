use visor_util::errors::VisorError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = VisorError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_config_error_display() {
    let err = VisorError::Config {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Config error: bad syntax");
}

#[test]
fn test_process_error_display() {
    let err = VisorError::Process {
        message: "make exited 2".to_string(),
    };
    assert_eq!(err.to_string(), "Process error: make exited 2");
}

#[test]
fn test_generic_error_display() {
    let err = VisorError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}
