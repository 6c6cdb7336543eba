//! Collaborator interfaces for the link supervisor
//!
//! The supervisor never touches a radio, socket or protocol directly. It reads
//! raw status from, and issues non-blocking requests to, the capability sets
//! defined here. Real implementations live in [`network`] and [`mqtt`];
//! scriptable ones in [`crate::testing`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

pub mod mqtt;
pub mod network;

/// Fixed per-packet overhead assumed when checking the inbound budget
pub const PACKET_HEADER_OVERHEAD: usize = 9;

/// Credentials for joining a network owned by this instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub password: String,
}

/// Message the broker publishes for us if the session drops uncleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWill {
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub retain: bool,
}

/// Everything a session collaborator needs for one connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub last_will: Option<LastWill>,
    pub clean_session: bool,
}

/// Credentials handed to the update service on initialisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCredentials {
    pub path: String,
    pub username: String,
    pub password: String,
}

/// Reason code reported by the session collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionErrorCode {
    ConnectionTimeout,
    ConnectionLost,
    ConnectFailed,
    Disconnected,
    Connected,
    BadProtocol,
    BadClientId,
    Unavailable,
    BadCredentials,
    Unauthorized,
}

impl SessionErrorCode {
    /// Numeric state code, negative for client-side conditions
    pub fn code(self) -> i8 {
        match self {
            SessionErrorCode::ConnectionTimeout => -4,
            SessionErrorCode::ConnectionLost => -3,
            SessionErrorCode::ConnectFailed => -2,
            SessionErrorCode::Disconnected => -1,
            SessionErrorCode::Connected => 0,
            SessionErrorCode::BadProtocol => 1,
            SessionErrorCode::BadClientId => 2,
            SessionErrorCode::Unavailable => 3,
            SessionErrorCode::BadCredentials => 4,
            SessionErrorCode::Unauthorized => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SessionErrorCode::ConnectionTimeout => "MQTT_CONNECTION_TIMEOUT",
            SessionErrorCode::ConnectionLost => "MQTT_CONNECTION_LOST",
            SessionErrorCode::ConnectFailed => "MQTT_CONNECT_FAILED",
            SessionErrorCode::Disconnected => "MQTT_DISCONNECTED",
            SessionErrorCode::Connected => "MQTT_CONNECTED",
            SessionErrorCode::BadProtocol => "MQTT_CONNECT_BAD_PROTOCOL",
            SessionErrorCode::BadClientId => "MQTT_CONNECT_BAD_CLIENT_ID",
            SessionErrorCode::Unavailable => "MQTT_CONNECT_UNAVAILABLE",
            SessionErrorCode::BadCredentials => "MQTT_CONNECT_BAD_CREDENTIALS",
            SessionErrorCode::Unauthorized => "MQTT_CONNECT_UNAUTHORIZED",
        }
    }
}

impl fmt::Display for SessionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Payload length as received, before any truncation
    pub received_len: usize,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        let received_len = payload.len();
        Self {
            topic: topic.into(),
            payload,
            received_len,
        }
    }

    /// Build a message, cutting the payload so the packet fits `buffer_size`
    ///
    /// A packet is over budget when topic, payload and header overhead reach
    /// the buffer size. The payload is then shortened to the largest length
    /// that fits; the message is still delivered.
    pub fn within_budget(topic: impl Into<String>, mut payload: Vec<u8>, buffer_size: usize) -> Self {
        let topic = topic.into();
        let received_len = payload.len();
        if topic.len() + payload.len() + PACKET_HEADER_OVERHEAD >= buffer_size {
            let room = buffer_size
                .saturating_sub(topic.len() + PACKET_HEADER_OVERHEAD + 1)
                .min(payload.len());
            payload.truncate(room);
        }
        Self {
            topic,
            payload,
            received_len,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.payload.len() < self.received_len
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Raw network association driver
pub trait NetworkDriver {
    /// Current association level
    fn is_associated(&mut self) -> bool;

    /// Start joining a network; must return without waiting for the outcome
    fn begin_association(&mut self, credentials: &NetworkCredentials, host_name: &str);

    /// Drop any association, stale or not
    fn force_disassociate(&mut self);

    /// Address assigned on the associated network, for reporting
    fn local_address(&self) -> Option<IpAddr> {
        None
    }

    /// Hardware (MAC) address of the interface
    fn hardware_address(&self) -> Option<[u8; 6]> {
        None
    }
}

/// Broker session transport
pub trait SessionTransport {
    fn is_session_active(&self) -> bool;

    /// Start (or synchronously try, within a bounded time) a session
    fn begin_session(&mut self, params: &SessionParams) -> bool;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool;

    fn subscribe_wire(&mut self, topic: &str) -> bool;

    fn unsubscribe_wire(&mut self, topic: &str) -> bool;

    /// One unit of protocol housekeeping; inbound messages go to `deliver`
    fn pump(&mut self, deliver: &mut dyn FnMut(InboundMessage));

    fn last_error_code(&self) -> SessionErrorCode;

    /// Drop the session after the network underneath it went away
    ///
    /// Afterwards `is_session_active` reports false until a new session is
    /// begun.
    fn abandon(&mut self) {}
}

/// Optional firmware/update server living next to the link
pub trait UpdateService {
    fn initialize(&mut self, host_name: &str, address: Option<IpAddr>, credentials: &UpdateCredentials);

    /// Per-tick servicing while the network is up
    fn service(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers_and_names() {
        assert_eq!(SessionErrorCode::ConnectionTimeout.code(), -4);
        assert_eq!(SessionErrorCode::Connected.code(), 0);
        assert_eq!(SessionErrorCode::Unauthorized.code(), 5);
        assert_eq!(
            SessionErrorCode::BadClientId.to_string(),
            "MQTT_CONNECT_BAD_CLIENT_ID"
        );
    }

    #[test]
    fn test_message_within_budget_is_untouched() {
        let message = InboundMessage::within_budget("a/b", b"hello".to_vec(), 256);
        assert_eq!(message.payload, b"hello");
        assert!(!message.is_truncated());
        assert_eq!(message.payload_text(), "hello");
    }

    #[test]
    fn test_message_over_budget_is_cut_to_fit() {
        // 3 + 20 + 9 = 32 >= 32, so the payload has to shrink
        let message = InboundMessage::within_budget("a/b", vec![b'x'; 20], 32);
        assert!(message.is_truncated());
        assert_eq!(message.received_len, 20);
        assert_eq!(message.payload.len(), 32 - 3 - 9 - 1);
        assert!(message.topic.len() + message.payload.len() + PACKET_HEADER_OVERHEAD < 32);
    }

    #[test]
    fn test_tiny_budget_truncates_to_empty() {
        let message = InboundMessage::within_budget("long/topic/name", b"data".to_vec(), 8);
        assert!(message.payload.is_empty());
        assert!(message.is_truncated());
    }

    #[test]
    fn test_invalid_utf8_payload_is_lossy() {
        let message = InboundMessage::new("t", vec![0x66, 0xff, 0x6f]);
        assert_eq!(message.payload_text(), "f\u{fffd}o");
    }
}
