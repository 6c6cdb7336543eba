use linkkeeper::config::{ConfigError, LinkConfig};
use linkkeeper::LinkSupervisor;
use linkkeeper::testing::{ManualClock, MockNetwork, MockSession};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_valid_config() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
name = "garage-door"

[network]
ssid = "workshop"

[mqtt]
broker_url = "mqtt://192.168.1.100:1883"
persistent_session = true

[mqtt.last_will]
topic = "garage-door/status"
message = "offline"
retain = true

[mqtt.reconnect]
backoff_ms = [1000, 5000]
sustained_delay_ms = 20000

[limits]
max_subscriptions = 4
max_delayed_tasks = 6

[runner]
tick_ms = 25
subscribe = ["garage-door/cmd/#"]
"#
    )
    .unwrap();

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config.device.name, "garage-door");
    assert_eq!(config.network.as_ref().unwrap().ssid, "workshop");
    assert_eq!(config.mqtt.broker_url, "mqtt://192.168.1.100:1883");
    assert!(config.mqtt.persistent_session);
    assert_eq!(config.mqtt.reconnect.backoff_ms, vec![1000, 5000]);
    assert_eq!(config.runner.subscribe, vec!["garage-door/cmd/#".to_string()]);

    let settings = config.resolve().unwrap();
    assert!(settings.owns_network());
    assert!(!settings.clean_session);
    assert_eq!(settings.max_subscriptions, 4);
    assert_eq!(settings.max_delayed_tasks, 6);
    assert_eq!(settings.reconnect.sustained_delay, 20000);
    assert_eq!(settings.last_will.unwrap().message, "offline");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
broker_url = "mqtt://localhost"
"#
    )
    .unwrap();

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
    let settings = config.resolve().unwrap();

    assert_eq!(settings.client_name, "linkkeeper");
    assert!(!settings.owns_network());
    assert!(settings.auto_connect);
    assert!(settings.clean_session);
    assert_eq!(settings.max_subscriptions, 10);
    assert_eq!(settings.max_delayed_tasks, 10);
    assert_eq!(settings.reconnect.sustained_delay, 30000);
    assert!(settings.update.is_none());
}

#[test]
fn test_missing_file_is_read_error() {
    let result = LinkConfig::load_from_file(std::path::Path::new("/nonexistent/linkkeeper.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt\nbroker_url = ").unwrap();

    let result = LinkConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unsupported_broker_scheme_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
broker_url = "http://localhost:1883"
"#
    )
    .unwrap();

    let result = LinkConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_zero_capacity_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
broker_url = "mqtt://localhost"

[limits]
max_subscriptions = 0
"#
    )
    .unwrap();

    let result = LinkConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_credentials_resolved_from_environment() {
    std::env::set_var("LINKKEEPER_IT_MQTT_USER", "device-user");
    std::env::set_var("LINKKEEPER_IT_MQTT_PASS", "device-pass");

    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
broker_url = "mqtts://broker.example.com"
username_env = "LINKKEEPER_IT_MQTT_USER"
password_env = "LINKKEEPER_IT_MQTT_PASS"

[update]
enabled = true
path = "/firmware"
"#
    )
    .unwrap();

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
    let settings = config.resolve().unwrap();

    assert_eq!(settings.mqtt_username.as_deref(), Some("device-user"));
    assert_eq!(settings.mqtt_password.as_deref(), Some("device-pass"));
    let update = settings.update.as_ref().unwrap();
    assert_eq!(update.path, "/firmware");
    assert_eq!(update.username, "device-user");

    let redacted = settings.redacted();
    assert_ne!(redacted.mqtt_password.as_deref(), Some("device-pass"));

    std::env::remove_var("LINKKEEPER_IT_MQTT_USER");
    std::env::remove_var("LINKKEEPER_IT_MQTT_PASS");
}

#[test]
fn test_missing_network_password_variable_fails_resolution() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[network]
ssid = "home"
password_env = "LINKKEEPER_IT_UNSET_NETWORK_PASSWORD"

[mqtt]
broker_url = "mqtt://localhost"
"#
    )
    .unwrap();

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
    assert!(matches!(config.resolve(), Err(ConfigError::EnvVarNotFound(_))));
}

#[test]
fn test_loaded_settings_drive_a_supervisor() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
name = "hall-sensor"

[mqtt]
broker_url = "mqtt://localhost"
auto_connect = false

[limits]
max_subscriptions = 1
"#
    )
    .unwrap();

    let settings = LinkConfig::load_from_file(temp_file.path())
        .unwrap()
        .resolve()
        .unwrap();
    let network = MockNetwork::new();
    let session = MockSession::new();
    let mut link = LinkSupervisor::with_clock(
        settings,
        network.clone(),
        session.clone(),
        ManualClock::new(0),
    );

    network.set_associated(true);
    link.tick();
    link.tick();
    assert_eq!(session.connect_attempts(), 0);

    let status = link.status();
    assert_eq!(status.client_name, "hall-sensor");
    assert_eq!(status.subscription_capacity, 1);
}
