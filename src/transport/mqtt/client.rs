//! Broker session over rumqttc's blocking client
//!
//! Each connect attempt builds a fresh client and connection. The attempt
//! waits for the broker's ConnAck for at most the configured connect
//! timeout; afterwards the connection is only polled without blocking, from
//! [`SessionTransport::pump`].

use super::connection::{configure_mqtt_options, session_settings, SessionTuning};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{BrokerEndpoint, ConfigError, MqttSection};
use crate::transport::{InboundMessage, SessionErrorCode, SessionParams, SessionTransport};
use rumqttc::{Client, ConnectReturnCode, Connection, QoS, RecvTimeoutError, TryRecvError};
use std::time::Instant;
use tracing::{debug, warn};

/// Upper bound on events processed by one pump call
const MAX_EVENTS_PER_PUMP: usize = 32;

/// Session transport backed by a rumqttc [`Client`]
pub struct RumqttcSession {
    endpoint: BrokerEndpoint,
    tuning: SessionTuning,
    client: Option<Client>,
    connection: Option<Connection>,
    active: bool,
    last_error: SessionErrorCode,
}

impl RumqttcSession {
    pub fn new(endpoint: BrokerEndpoint, tuning: SessionTuning) -> Self {
        Self {
            endpoint,
            tuning,
            client: None,
            connection: None,
            active: false,
            last_error: SessionErrorCode::Disconnected,
        }
    }

    pub fn from_config(config: &MqttSection) -> Result<Self, ConfigError> {
        let (endpoint, tuning) = session_settings(config)?;
        Ok(Self::new(endpoint, tuning))
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Inbound packet budget to hand to the supervisor
    pub fn buffer_size(&self) -> usize {
        self.tuning.buffer_size
    }

    /// Drop the current client and connection, remembering why
    fn close(&mut self, reason: SessionErrorCode) {
        self.active = false;
        self.last_error = reason;
        self.client = None;
        self.connection = None;
    }

    /// Block until the broker answers the connect request or the timeout hits
    fn await_connack(&mut self) -> Result<(), SessionErrorCode> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(SessionErrorCode::Disconnected);
        };

        let deadline = Instant::now() + self.tuning.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionErrorCode::ConnectionTimeout);
            }

            match connection.recv_timeout(remaining) {
                Ok(Ok(event)) => match MessageHandler::route_event(&event) {
                    EventRoute::ConnectionAcknowledged {
                        code: ConnectReturnCode::Success,
                    } => return Ok(()),
                    EventRoute::ConnectionAcknowledged { code } => {
                        return Err(MessageHandler::map_return_code(code));
                    }
                    EventRoute::Disconnected => return Err(SessionErrorCode::Disconnected),
                    _ => continue,
                },
                Ok(Err(error)) => {
                    debug!(error = %error, "Connect attempt failed");
                    return Err(MessageHandler::map_connection_error(&error, false));
                }
                Err(RecvTimeoutError::Timeout) => return Err(SessionErrorCode::ConnectionTimeout),
                Err(RecvTimeoutError::Disconnected) => return Err(SessionErrorCode::ConnectFailed),
            }
        }
    }
}

impl SessionTransport for RumqttcSession {
    fn is_session_active(&self) -> bool {
        self.active
    }

    fn begin_session(&mut self, params: &SessionParams) -> bool {
        let options = configure_mqtt_options(&self.endpoint, params, &self.tuning);
        let (client, connection) = Client::new(options, self.tuning.request_capacity);
        self.client = Some(client);
        self.connection = Some(connection);

        match self.await_connack() {
            Ok(()) => {
                self.active = true;
                self.last_error = SessionErrorCode::Connected;
                true
            }
            Err(code) => {
                self.close(code);
                false
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        if !self.active {
            return false;
        }
        match self.client.as_ref() {
            Some(client) => match client.try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Publish request rejected");
                    false
                }
            },
            None => false,
        }
    }

    fn subscribe_wire(&mut self, topic: &str) -> bool {
        if !self.active {
            return false;
        }
        match self.client.as_ref() {
            Some(client) => client.try_subscribe(topic, QoS::AtMostOnce).is_ok(),
            None => false,
        }
    }

    fn unsubscribe_wire(&mut self, topic: &str) -> bool {
        if !self.active {
            return false;
        }
        match self.client.as_ref() {
            Some(client) => client.try_unsubscribe(topic).is_ok(),
            None => false,
        }
    }

    fn pump(&mut self, deliver: &mut dyn FnMut(InboundMessage)) {
        let buffer_size = self.tuning.buffer_size;
        let mut closed = None;

        if let Some(connection) = self.connection.as_mut() {
            for _ in 0..MAX_EVENTS_PER_PUMP {
                match connection.try_recv() {
                    Ok(Ok(event)) => match MessageHandler::route_event(&event) {
                        EventRoute::MessageReceived { topic, payload } => {
                            deliver(InboundMessage::within_budget(topic, payload, buffer_size));
                        }
                        EventRoute::Disconnected => {
                            closed = Some(SessionErrorCode::Disconnected);
                            break;
                        }
                        EventRoute::SubscriptionConfirmed {
                            packet_id,
                            accepted: false,
                        } => {
                            warn!(packet_id, "Broker refused subscription");
                        }
                        _ => {}
                    },
                    Ok(Err(error)) => {
                        debug!(error = %error, "Session connection error");
                        closed = Some(MessageHandler::map_connection_error(&error, true));
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = Some(SessionErrorCode::ConnectionLost);
                        break;
                    }
                }
            }
        }

        if let Some(reason) = closed {
            self.close(reason);
        }
    }

    fn last_error_code(&self) -> SessionErrorCode {
        self.last_error
    }

    fn abandon(&mut self) {
        if self.active {
            debug!("Abandoning MQTT session after network loss");
        }
        self.close(SessionErrorCode::ConnectionLost);
    }
}
