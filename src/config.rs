//! Configuration for the link supervisor
//!
//! The TOML file names environment variables for every secret; values are
//! read when the file is resolved into [`LinkSettings`], never stored in it.

use crate::link::tracker::ReconnectConfig;
use crate::transport::{LastWill, NetworkCredentials, UpdateCredentials, PACKET_HEADER_OVERHEAD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    #[serde(default)]
    pub device: DeviceSection,
    /// Present when this instance owns network association
    pub network: Option<NetworkSection>,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub update: UpdateSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub runner: RunnerSection,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Client id and host name hint
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Use the interface hardware address as the client id
    #[serde(default)]
    pub client_id_from_hardware_address: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            client_id_from_hardware_address: false,
        }
    }
}

fn default_device_name() -> String {
    "linkkeeper".to_string()
}

/// Network owned by this instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    pub ssid: String,
    /// Environment variable containing the network password
    pub password_env: Option<String>,
}

/// Broker session section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Ask the broker for a persistent session (clean-session off)
    #[serde(default)]
    pub persistent_session: bool,
    /// Administrative switch for automatic session attempts
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Upper bound for one connect attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Inbound packet budget; larger packets are delivered truncated
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    pub last_will: Option<LastWill>,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Session retry policy as written in the file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default)]
    pub backoff_ms: Vec<u64>,
    #[serde(default = "default_sustained_delay")]
    pub sustained_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            backoff_ms: Vec::new(),
            sustained_delay_ms: default_sustained_delay(),
        }
    }
}

impl From<&ReconnectSection> for ReconnectConfig {
    fn from(section: &ReconnectSection) -> Self {
        ReconnectConfig {
            backoff_pattern: section.backoff_ms.clone(),
            sustained_delay: section.sustained_delay_ms,
        }
    }
}

/// Update service section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_update_path")]
    pub path: String,
    /// Defaults to the MQTT username when absent
    pub username_env: Option<String>,
    /// Defaults to the MQTT password when absent
    pub password_env: Option<String>,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_update_path(),
            username_env: None,
            password_env: None,
        }
    }
}

/// Table capacities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    #[serde(default = "default_capacity")]
    pub max_subscriptions: usize,
    #[serde(default = "default_capacity")]
    pub max_delayed_tasks: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_subscriptions: default_capacity(),
            max_delayed_tasks: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Report link events (connecting, subscribed, message echo)
    #[serde(default)]
    pub debug_messages: bool,
}

/// Settings for the `run` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerSection {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Patterns subscribed on every session establishment
    #[serde(default)]
    pub subscribe: Vec<String>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            subscribe: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    3_000
}

fn default_buffer_size() -> usize {
    256
}

fn default_sustained_delay() -> u64 {
    crate::link::tracker::DEFAULT_SESSION_RETRY_DELAY_MS
}

fn default_update_path() -> String {
    "/".to_string()
}

fn default_capacity() -> usize {
    10
}

fn default_tick_ms() -> u64 {
    10
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.name must not be empty".to_string(),
            ));
        }

        parse_broker_url(&self.mqtt.broker_url)?;

        if let Some(network) = &self.network {
            if network.ssid.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "network.ssid must not be empty".to_string(),
                ));
            }
        }

        if self.mqtt.buffer_size <= PACKET_HEADER_OVERHEAD {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.buffer_size must be greater than {PACKET_HEADER_OVERHEAD}"
            )));
        }

        if self.mqtt.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(will) = &self.mqtt.last_will {
            if will.topic.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "mqtt.last_will.topic must not be empty".to_string(),
                ));
            }
        }

        ReconnectConfig::from(&self.mqtt.reconnect)
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("mqtt.reconnect: {e}")))?;

        if self.limits.max_subscriptions == 0 || self.limits.max_delayed_tasks == 0 {
            return Err(ConfigError::InvalidConfig(
                "limits must be greater than 0".to_string(),
            ));
        }

        if self.runner.tick_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "runner.tick_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve secrets from the environment into runtime settings
    pub fn resolve(&self) -> Result<LinkSettings, ConfigError> {
        let mqtt_username = get_env_var_optional(self.mqtt.username_env.as_ref());
        let mqtt_password = get_env_var_optional(self.mqtt.password_env.as_ref());

        let network = match &self.network {
            Some(section) => Some(NetworkCredentials {
                ssid: section.ssid.clone(),
                password: match &section.password_env {
                    Some(name) => get_env_var_required(name)?,
                    None => String::new(),
                },
            }),
            None => None,
        };

        let update = if self.update.enabled {
            Some(UpdateCredentials {
                path: self.update.path.clone(),
                username: get_env_var_optional(self.update.username_env.as_ref())
                    .or_else(|| mqtt_username.clone())
                    .unwrap_or_default(),
                password: get_env_var_optional(self.update.password_env.as_ref())
                    .or_else(|| mqtt_password.clone())
                    .unwrap_or_default(),
            })
        } else {
            None
        };

        Ok(LinkSettings {
            client_name: self.device.name.clone(),
            client_id_from_hardware_address: self.device.client_id_from_hardware_address,
            network,
            mqtt_username,
            mqtt_password,
            clean_session: !self.mqtt.persistent_session,
            last_will: self.mqtt.last_will.clone(),
            auto_connect: self.mqtt.auto_connect,
            reconnect: ReconnectConfig::from(&self.mqtt.reconnect),
            max_subscriptions: self.limits.max_subscriptions,
            max_delayed_tasks: self.limits.max_delayed_tasks,
            debug_messages: self.logging.debug_messages,
            update,
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
name = "test-device"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Broker host, port and TLS flag parsed from a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://host[:port]` or `mqtts://host[:port]`
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerEndpoint, ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        _ => return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerEndpoint {
        host: host.to_string(),
        port,
        tls,
    })
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name).map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

/// Resolved runtime settings for one supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub client_name: String,
    pub client_id_from_hardware_address: bool,
    /// Credentials when this instance owns network association
    pub network: Option<NetworkCredentials>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub clean_session: bool,
    pub last_will: Option<LastWill>,
    pub auto_connect: bool,
    pub reconnect: ReconnectConfig,
    pub max_subscriptions: usize,
    pub max_delayed_tasks: usize,
    pub debug_messages: bool,
    pub update: Option<UpdateCredentials>,
}

impl LinkSettings {
    /// Settings for an externally managed network with no broker credentials
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ..Self::default()
        }
    }

    pub fn with_network(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.network = Some(NetworkCredentials {
            ssid: ssid.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.mqtt_username = Some(username.into());
        self.mqtt_password = Some(password.into());
        self
    }

    pub fn with_capacities(mut self, max_subscriptions: usize, max_delayed_tasks: usize) -> Self {
        self.max_subscriptions = max_subscriptions;
        self.max_delayed_tasks = max_delayed_tasks;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// This instance is responsible for (re)associating with the network
    pub fn owns_network(&self) -> bool {
        self.network.is_some()
    }

    /// Copy with every password replaced, for display
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if let Some(network) = settings.network.as_mut() {
            network.password = redact(&network.password);
        }
        settings.mqtt_password = settings.mqtt_password.as_deref().map(redact);
        if let Some(update) = settings.update.as_mut() {
            update.password = redact(&update.password);
        }
        settings
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            client_name: default_device_name(),
            client_id_from_hardware_address: false,
            network: None,
            mqtt_username: None,
            mqtt_password: None,
            clean_session: true,
            last_will: None,
            auto_connect: true,
            reconnect: ReconnectConfig::default(),
            max_subscriptions: default_capacity(),
            max_delayed_tasks: default_capacity(),
            debug_messages: false,
            update: None,
        }
    }
}
