//! Event routing for the broker session
//!
//! Pure functions that classify rumqttc events and translate broker refusal
//! codes and connection errors into [`SessionErrorCode`]s.

use crate::transport::SessionErrorCode;
use rumqttc::{ConnectReturnCode, ConnectionError, Event, Packet, SubscribeReasonCode};

/// Routing decisions for session events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker answered the connect request
    ConnectionAcknowledged { code: ConnectReturnCode },
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker closed the session
    Disconnected,
    /// Subscription answered; `accepted` is false if any filter was refused
    SubscriptionConfirmed { packet_id: u16, accepted: bool },
    /// Keep-alive and acknowledgement traffic
    InfrastructureEvent(String),
    /// Outgoing event (handled by rumqttc)
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route an event to the appropriate handling
    pub fn route_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged { code: connack.code },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    accepted: suback
                        .return_codes
                        .iter()
                        .all(|code| !matches!(code, SubscribeReasonCode::Failure)),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Translate a broker connect return code
    pub fn map_return_code(code: ConnectReturnCode) -> SessionErrorCode {
        match code {
            ConnectReturnCode::Success => SessionErrorCode::Connected,
            ConnectReturnCode::RefusedProtocolVersion => SessionErrorCode::BadProtocol,
            ConnectReturnCode::BadClientId => SessionErrorCode::BadClientId,
            ConnectReturnCode::ServiceUnavailable => SessionErrorCode::Unavailable,
            ConnectReturnCode::BadUserNamePassword => SessionErrorCode::BadCredentials,
            ConnectReturnCode::NotAuthorized => SessionErrorCode::Unauthorized,
        }
    }

    /// Translate a connection error; `was_active` separates a dropped
    /// session from a failed connect
    pub fn map_connection_error(error: &ConnectionError, was_active: bool) -> SessionErrorCode {
        match error {
            ConnectionError::ConnectionRefused(code) => Self::map_return_code(*code),
            ConnectionError::NetworkTimeout => SessionErrorCode::ConnectionTimeout,
            _ if was_active => SessionErrorCode::ConnectionLost,
            _ => SessionErrorCode::ConnectFailed,
        }
    }
}
