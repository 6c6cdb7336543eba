//! Mock collaborators and a manual clock
//!
//! Every mock is a cheap handle over shared state: clone it, give one copy to
//! the supervisor and keep the other to script levels and inspect requests.

use crate::link::clock::Clock;
use crate::transport::{
    InboundMessage, NetworkCredentials, NetworkDriver, SessionErrorCode, SessionParams,
    SessionTransport, UpdateCredentials, UpdateService,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::rc::Rc;

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    /// Jump to `ms`; callers keep time monotonic
    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

#[derive(Debug, Default)]
struct NetworkInner {
    associated: bool,
    associate_on_request: bool,
    local_address: Option<IpAddr>,
    hardware_address: Option<[u8; 6]>,
    association_requests: Vec<(String, String)>,
    disassociate_calls: usize,
}

/// Scriptable network driver
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    inner: Rc<RefCell<NetworkInner>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_associated(&self, associated: bool) {
        self.inner.borrow_mut().associated = associated;
    }

    /// Association requests complete immediately (seen on the next read)
    pub fn set_associate_on_request(&self, enabled: bool) {
        self.inner.borrow_mut().associate_on_request = enabled;
    }

    pub fn set_local_address(&self, address: Option<IpAddr>) {
        self.inner.borrow_mut().local_address = address;
    }

    pub fn set_hardware_address(&self, address: [u8; 6]) {
        self.inner.borrow_mut().hardware_address = Some(address);
    }

    /// `(ssid, host name)` of every association request
    pub fn association_requests(&self) -> Vec<(String, String)> {
        self.inner.borrow().association_requests.clone()
    }

    pub fn disassociate_calls(&self) -> usize {
        self.inner.borrow().disassociate_calls
    }
}

impl NetworkDriver for MockNetwork {
    fn is_associated(&mut self) -> bool {
        self.inner.borrow().associated
    }

    fn begin_association(&mut self, credentials: &NetworkCredentials, host_name: &str) {
        let mut inner = self.inner.borrow_mut();
        inner
            .association_requests
            .push((credentials.ssid.clone(), host_name.to_string()));
        if inner.associate_on_request {
            inner.associated = true;
        }
    }

    fn force_disassociate(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.associated = false;
        inner.disassociate_calls += 1;
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.inner.borrow().local_address
    }

    fn hardware_address(&self) -> Option<[u8; 6]> {
        self.inner.borrow().hardware_address
    }
}

#[derive(Debug)]
struct SessionInner {
    active: bool,
    accept_connect: bool,
    fail_publish: bool,
    fail_subscribe: bool,
    fail_unsubscribe: bool,
    error_code: SessionErrorCode,
    connect_params: Vec<SessionParams>,
    published: Vec<(String, Vec<u8>, bool)>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    pump_calls: usize,
    abandon_calls: usize,
}

impl Default for SessionInner {
    fn default() -> Self {
        Self {
            active: false,
            accept_connect: true,
            fail_publish: false,
            fail_subscribe: false,
            fail_unsubscribe: false,
            error_code: SessionErrorCode::Disconnected,
            connect_params: Vec::new(),
            published: Vec::new(),
            subscribed: Vec::new(),
            unsubscribed: Vec::new(),
            inbound: VecDeque::new(),
            pump_calls: 0,
            abandon_calls: 0,
        }
    }
}

/// Scriptable session transport
///
/// Connect attempts succeed (and make the session active) unless
/// [`set_accept_connect(false)`](Self::set_accept_connect) was called.
/// Publish and (un)subscribe only succeed while the session is active.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    inner: Rc<RefCell<SessionInner>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        self.inner.borrow_mut().active = active;
    }

    pub fn set_accept_connect(&self, accept: bool) {
        self.inner.borrow_mut().accept_connect = accept;
    }

    pub fn set_error_code(&self, code: SessionErrorCode) {
        self.inner.borrow_mut().error_code = code;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.borrow_mut().fail_publish = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.borrow_mut().fail_subscribe = fail;
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.inner.borrow_mut().fail_unsubscribe = fail;
    }

    /// Queue a message for the next pump
    pub fn push_message(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.push_inbound(InboundMessage::new(topic, payload.into()));
    }

    pub fn push_inbound(&self, message: InboundMessage) {
        self.inner.borrow_mut().inbound.push_back(message);
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.borrow().connect_params.len()
    }

    pub fn connect_params(&self) -> Vec<SessionParams> {
        self.inner.borrow().connect_params.clone()
    }

    /// `(topic, payload, retain)` of every accepted publish
    pub fn published(&self) -> Vec<(String, Vec<u8>, bool)> {
        self.inner.borrow().published.clone()
    }

    pub fn wire_subscriptions(&self) -> Vec<String> {
        self.inner.borrow().subscribed.clone()
    }

    pub fn wire_unsubscriptions(&self) -> Vec<String> {
        self.inner.borrow().unsubscribed.clone()
    }

    pub fn pump_calls(&self) -> usize {
        self.inner.borrow().pump_calls
    }

    pub fn abandon_calls(&self) -> usize {
        self.inner.borrow().abandon_calls
    }
}

impl SessionTransport for MockSession {
    fn is_session_active(&self) -> bool {
        self.inner.borrow().active
    }

    fn begin_session(&mut self, params: &SessionParams) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.connect_params.push(params.clone());
        if inner.accept_connect {
            inner.active = true;
            inner.error_code = SessionErrorCode::Connected;
        }
        inner.accept_connect
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.active || inner.fail_publish {
            return false;
        }
        inner
            .published
            .push((topic.to_string(), payload.to_vec(), retain));
        true
    }

    fn subscribe_wire(&mut self, topic: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.active || inner.fail_subscribe {
            return false;
        }
        inner.subscribed.push(topic.to_string());
        true
    }

    fn unsubscribe_wire(&mut self, topic: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.active || inner.fail_unsubscribe {
            return false;
        }
        inner.unsubscribed.push(topic.to_string());
        true
    }

    fn pump(&mut self, deliver: &mut dyn FnMut(InboundMessage)) {
        // Release the borrow before delivering; handlers may hold a handle
        let messages: Vec<InboundMessage> = {
            let mut inner = self.inner.borrow_mut();
            inner.pump_calls += 1;
            inner.inbound.drain(..).collect()
        };
        for message in messages {
            deliver(message);
        }
    }

    fn last_error_code(&self) -> SessionErrorCode {
        self.inner.borrow().error_code
    }

    fn abandon(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.abandon_calls += 1;
        inner.active = false;
        inner.error_code = SessionErrorCode::ConnectionLost;
    }
}

#[derive(Debug, Default)]
struct UpdateInner {
    initializations: Vec<(String, UpdateCredentials)>,
    addresses: Vec<Option<IpAddr>>,
    service_calls: usize,
}

/// Recording update service
#[derive(Debug, Clone, Default)]
pub struct MockUpdateService {
    inner: Rc<RefCell<UpdateInner>>,
}

impl MockUpdateService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(host name, credentials)` of every initialisation
    pub fn initializations(&self) -> Vec<(String, UpdateCredentials)> {
        self.inner.borrow().initializations.clone()
    }

    pub fn initialized_addresses(&self) -> Vec<Option<IpAddr>> {
        self.inner.borrow().addresses.clone()
    }

    pub fn service_calls(&self) -> usize {
        self.inner.borrow().service_calls
    }
}

impl UpdateService for MockUpdateService {
    fn initialize(&mut self, host_name: &str, address: Option<IpAddr>, credentials: &UpdateCredentials) {
        let mut inner = self.inner.borrow_mut();
        inner
            .initializations
            .push((host_name.to_string(), credentials.clone()));
        inner.addresses.push(address);
    }

    fn service(&mut self) {
        self.inner.borrow_mut().service_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        let handle = clock.clone();
        handle.advance(10);
        assert_eq!(clock.now_ms(), 15);
        handle.set(100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn test_mock_session_requires_active_session() {
        let handle = MockSession::new();
        let mut session = handle.clone();

        assert!(!session.publish("a", b"x", false));
        assert!(!session.subscribe_wire("a"));

        let params = SessionParams {
            client_id: "c".to_string(),
            username: None,
            password: None,
            last_will: None,
            clean_session: true,
        };
        assert!(session.begin_session(&params));
        assert!(session.is_session_active());
        assert!(session.publish("a", b"x", true));
        assert_eq!(handle.published(), vec![("a".to_string(), b"x".to_vec(), true)]);
        assert_eq!(handle.connect_attempts(), 1);
    }

    #[test]
    fn test_mock_session_pump_drains_queue() {
        let handle = MockSession::new();
        let mut session = handle.clone();
        handle.push_message("a/b", "one");
        handle.push_message("a/c", "two");

        let mut topics = Vec::new();
        session.pump(&mut |message: InboundMessage| topics.push(message.topic));
        assert_eq!(topics, vec!["a/b", "a/c"]);

        session.pump(&mut |_: InboundMessage| panic!("queue should be empty"));
        assert_eq!(handle.pump_calls(), 2);
    }

    #[test]
    fn test_mock_network_records_requests() {
        let handle = MockNetwork::new();
        let mut network = handle.clone();
        handle.set_associate_on_request(true);

        let credentials = NetworkCredentials {
            ssid: "home".to_string(),
            password: "pw".to_string(),
        };
        network.begin_association(&credentials, "dev");
        assert!(network.is_associated());

        network.force_disassociate();
        assert!(!network.is_associated());
        assert_eq!(handle.disassociate_calls(), 1);
        assert_eq!(handle.association_requests(), vec![("home".to_string(), "dev".to_string())]);
    }
}
