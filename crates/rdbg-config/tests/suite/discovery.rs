use std::io::Write;

use rdbg_config::{ConfigError, RdbgConfig};
use tempfile::{tempdir, NamedTempFile};

#[test]
fn explicit_path_is_loaded() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "[connection]\nhost = \"10.0.0.2\"\nport = 4000").expect("write config");

    let config = RdbgConfig::discover(Some(file.path())).expect("config should load");
    assert_eq!(config.connection.address(), "10.0.0.2:4000");
}

#[test]
fn validation_errors_fail_discovery() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "[trace.window]\nstep = 0").expect("write config");

    let err = RdbgConfig::discover(Some(file.path())).unwrap_err();
    match err {
        ConfigError::Invalid(message) => assert!(message.contains("trace.window.step"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_file_reports_its_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("rdbg.toml");

    let err = RdbgConfig::load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("rdbg.toml"));
}

#[test]
fn parse_errors_do_not_echo_values() {
    let mut file = NamedTempFile::new().expect("tempfile");
    writeln!(file, "[connection]\nport = \"hunter2\"").expect("write config");

    let err = RdbgConfig::load_from_path_with_diagnostics(file.path()).unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, ConfigError::Toml(_)));
    assert!(!message.contains("hunter2"), "{message}");
}
