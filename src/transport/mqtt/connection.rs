//! Connection option building for the broker session
//!
//! Pure functions that turn an endpoint, per-attempt session parameters and
//! tuning values into rumqttc options.

use crate::config::{parse_broker_url, BrokerEndpoint, ConfigError, MqttSection};
use crate::transport::SessionParams;
use rumqttc::{LastWill, MqttOptions, QoS, Transport};
use std::time::Duration;

/// Smallest keep-alive rumqttc accepts
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Per-broker values that do not change between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTuning {
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Inbound packet budget handed to the supervisor's truncation check
    pub buffer_size: usize,
    /// Outgoing request queue depth
    pub request_capacity: usize,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
            connect_timeout: Duration::from_millis(3_000),
            buffer_size: 256,
            request_capacity: 10,
        }
    }
}

impl SessionTuning {
    pub fn from_config(config: &MqttSection) -> Self {
        Self {
            keep_alive: Duration::from_secs(config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS)),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            buffer_size: config.buffer_size,
            ..Self::default()
        }
    }
}

/// Endpoint and tuning for the configured broker
pub fn session_settings(config: &MqttSection) -> Result<(BrokerEndpoint, SessionTuning), ConfigError> {
    let endpoint = parse_broker_url(&config.broker_url)?;
    Ok((endpoint, SessionTuning::from_config(config)))
}

/// Build rumqttc options for one connect attempt
pub fn configure_mqtt_options(
    endpoint: &BrokerEndpoint,
    params: &SessionParams,
    tuning: &SessionTuning,
) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(&params.client_id, &endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(Transport::tls_with_default_config());
    }

    if let Some(username) = &params.username {
        let password = params.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(tuning.keep_alive);
    mqtt_options.set_clean_session(params.clean_session);
    // Larger inbound packets are cut by the supervisor, so accept anything
    // the broker sends up to a generous ceiling.
    mqtt_options.set_max_packet_size(256 * 1024, 256 * 1024);

    if let Some(will) = &params.last_will {
        mqtt_options.set_last_will(LastWill::new(
            &will.topic,
            will.message.as_bytes().to_vec(),
            QoS::AtMostOnce,
            will.retain,
        ));
    }

    mqtt_options
}
