use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{RunMode, Settings};
use super::load_config_from;

const CLEAN_ENV: [(&str, Option<&str>); 4] = [
    ("PORT", None),
    ("APP_ENV", None),
    ("TICKBUS_SERVER__HOST", None),
    ("TICKBUS_PRODUCER__INTERVAL_MS", None),
];

fn missing_file() -> String {
    "does/not/exist/tickbus".to_string()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.server.graphql_path, "/api/graphql");
    assert_eq!(settings.server.mode, RunMode::Development);
    assert_eq!(settings.producer.topic, "NUMBER_INCREMENTED");
    assert_eq!(settings.producer.interval_ms, 1000);
    assert_eq!(settings.protocol.connection_init_timeout_ms, 3000);
    assert_eq!(settings.bus.listener_capacity, 64);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_run_mode_from_flag() {
    assert_eq!(RunMode::from("production".to_string()), RunMode::Production);
    assert_eq!(RunMode::from("PRODUCTION".to_string()), RunMode::Production);
    assert_eq!(RunMode::from("development".to_string()), RunMode::Development);
    assert_eq!(RunMode::from("staging".to_string()), RunMode::Development);
}

#[test]
#[serial]
fn test_load_without_sources_gives_defaults() {
    temp_env::with_vars(CLEAN_ENV, || {
        let settings = load_config_from(&missing_file()).expect("load_config failed");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.mode, RunMode::Development);
    });
}

#[test]
#[serial]
fn test_port_and_app_env_override() {
    temp_env::with_vars(CLEAN_ENV, || {
        temp_env::with_vars([("PORT", Some("4100")), ("APP_ENV", Some("production"))], || {
            let settings = load_config_from(&missing_file()).expect("load_config failed");
            assert_eq!(settings.server.port, 4100);
            assert_eq!(settings.server.mode, RunMode::Production);
        });
    });
}

#[test]
#[serial]
fn test_invalid_port_is_an_error() {
    temp_env::with_vars(CLEAN_ENV, || {
        temp_env::with_var("PORT", Some("not-a-port"), || {
            assert!(load_config_from(&missing_file()).is_err());
        });
    });
}

#[test]
#[serial]
fn test_prefixed_environment_override() {
    temp_env::with_vars(CLEAN_ENV, || {
        temp_env::with_vars(
            [
                ("TICKBUS_SERVER__HOST", Some("127.0.0.1")),
                ("TICKBUS_PRODUCER__INTERVAL_MS", Some("250")),
            ],
            || {
                let settings = load_config_from(&missing_file()).expect("load_config failed");
                assert_eq!(settings.server.host, "127.0.0.1");
                assert_eq!(settings.producer.interval_ms, 250);
            },
        );
    });
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("default.toml");
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 9000
        mode = "production"

        [producer]
        interval_ms = 50

        [shutdown]
        drain_timeout_ms = 500
    "#;
    fs::write(&path, toml).expect("write config file");

    temp_env::with_vars(CLEAN_ENV, || {
        let base = tmp.path().join("default");
        let settings = load_config_from(base.to_str().unwrap()).expect("load_config failed");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.mode, RunMode::Production);
        assert_eq!(settings.producer.interval_ms, 50);
        assert_eq!(settings.shutdown.drain_timeout_ms, 500);
        // untouched sections keep their defaults
        assert_eq!(settings.bus.listener_capacity, 64);
        assert_eq!(settings.server.graphql_path, "/api/graphql");
    });
}

#[test]
#[serial]
fn test_port_variable_beats_file() {
    let tmp = TempDir::new().expect("create tempdir");
    fs::write(tmp.path().join("default.toml"), "[server]\nport = 9000\n").unwrap();

    temp_env::with_vars(CLEAN_ENV, || {
        temp_env::with_var("PORT", Some("9100"), || {
            let base = tmp.path().join("default");
            let settings = load_config_from(base.to_str().unwrap()).unwrap();
            assert_eq!(settings.server.port, 9100);
        });
    });
}
