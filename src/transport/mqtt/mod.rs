//! MQTT session transport over rumqttc
//!
//! - [`connection`] - option building from endpoint, tuning and attempt parameters
//! - [`message_handler`] - event routing and reason-code translation
//! - [`client`] - the blocking-client [`SessionTransport`](crate::transport::SessionTransport)
//!
//! # Usage
//!
//! ```rust,no_run
//! use linkkeeper::config::LinkConfig;
//! use linkkeeper::transport::mqtt::RumqttcSession;
//!
//! let config = LinkConfig::from_toml_str(r#"
//! [mqtt]
//! broker_url = "mqtt://localhost:1883"
//! "#)?;
//! let session = RumqttcSession::from_config(&config.mqtt)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::RumqttcSession;
pub use connection::{configure_mqtt_options, SessionTuning};
pub use message_handler::{EventRoute, MessageHandler};
