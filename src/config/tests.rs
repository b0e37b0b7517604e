use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::{DEFAULT_BROKER_URL, Settings, load_config};

/// Runs `f` with the current directory set to a fresh tempdir so
/// `load_config` only sees the files the test writes.
fn with_temp_cwd(f: impl FnOnce()) {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");
    f();
    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
fn default_settings_are_complete() {
    let settings = Settings::default();
    assert_eq!(settings.broker.url, DEFAULT_BROKER_URL);
    assert_eq!(settings.session.incoming_heartbeat_ms, 10_000);
    assert_eq!(settings.session.outgoing_heartbeat_ms, 10_000);
    assert_eq!(settings.session.connect_timeout_ms, 8_000);
    assert_eq!(
        settings.reconnect.delays_ms,
        vec![1_000, 2_000, 5_000, 10_000, 30_000]
    );
}

#[test]
#[serial]
fn load_config_falls_back_to_defaults() {
    with_temp_cwd(|| {
        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg.broker.url, DEFAULT_BROKER_URL);
        assert_eq!(
            cfg.reconnect.delays_ms,
            Settings::default().reconnect.delays_ms
        );
    });
}

#[test]
#[serial]
fn load_config_reads_file_overrides() {
    with_temp_cwd(|| {
        fs::create_dir_all("config").expect("create config dir");
        let toml = r#"
            [broker]
            url = "wss://rooms.example.net/ws"

            [session]
            connect_timeout_ms = 1500

            [reconnect]
            delays_ms = [250, 750]
        "#;
        fs::write("config/default.toml", toml).expect("write config file");

        let cfg = load_config().expect("load_config failed");
        assert_eq!(cfg.broker.url, "wss://rooms.example.net/ws");
        assert_eq!(cfg.session.connect_timeout_ms, 1500);
        // keys the file does not mention keep their defaults
        assert_eq!(cfg.session.incoming_heartbeat_ms, 10_000);
        assert_eq!(cfg.reconnect.delays_ms, vec![250, 750]);
    });
}

#[test]
#[serial]
fn load_config_reads_environment_overrides() {
    with_temp_cwd(|| {
        temp_env::with_var("BROKER_URL", Some("ws://broker.internal:9001/ws"), || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.url, "ws://broker.internal:9001/ws");
        });
    });
}

#[test]
#[serial]
fn load_config_rejects_non_websocket_scheme() {
    with_temp_cwd(|| {
        temp_env::with_var("BROKER_URL", Some("https://rooms.example.net"), || {
            assert!(load_config().is_err());
        });
    });
}

#[test]
#[serial]
fn load_config_rejects_unparseable_endpoint() {
    with_temp_cwd(|| {
        temp_env::with_var("BROKER_URL", Some("not a url"), || {
            assert!(load_config().is_err());
        });
    });
}

#[test]
#[serial]
fn empty_backoff_table_is_replaced_with_default() {
    with_temp_cwd(|| {
        fs::create_dir_all("config").expect("create config dir");
        fs::write("config/default.toml", "[reconnect]\ndelays_ms = []\n")
            .expect("write config file");

        let cfg = load_config().expect("load_config failed");
        assert_eq!(
            cfg.reconnect.delays_ms,
            Settings::default().reconnect.delays_ms
        );
    });
}
