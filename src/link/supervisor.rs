//! The reconciliation loop
//!
//! [`LinkSupervisor::tick`] is called repeatedly by the host program. Each
//! call runs due delayed tasks, reconciles the network association and then,
//! only if the network level did not change this tick, reconciles the broker
//! session. Hooks fire on edges, never on stable levels.
//!
//! Nothing in a tick blocks for long: association attempts are fire and
//! forget, and a session attempt is bounded by the transport's own connect
//! timeout. Failures are reported through `tracing` and retried later; the
//! loop itself never fails.

use super::clock::{Clock, MonotonicClock};
use super::delayed::DelayedQueue;
use super::hooks::{self, LinkHooks};
use super::subscriptions::{SubscriptionHandler, SubscriptionTable};
use super::tracker::{Edge, LinkPhase, LinkState, ReconnectConfig, RetryDecision};
use crate::config::LinkSettings;
use crate::error::{LinkError, LinkKind, LinkResult};
use crate::observability::{link_event, LinkMetrics, MetricsSnapshot};
use crate::transport::{
    InboundMessage, LastWill, NetworkDriver, SessionParams, SessionTransport, UpdateCredentials,
    UpdateService,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Serializable view of a supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub client_name: String,
    pub network: LinkPhase,
    pub session: LinkPhase,
    pub established_count: u32,
    pub subscriptions: usize,
    pub subscription_capacity: usize,
    pub delayed_tasks: usize,
    pub delayed_capacity: usize,
    pub metrics: MetricsSnapshot,
}

/// Keeps a network association and a broker session alive
pub struct LinkSupervisor<N, S> {
    settings: LinkSettings,
    network: N,
    session: S,
    clock: Box<dyn Clock>,
    updater: Option<(Box<dyn UpdateService>, UpdateCredentials)>,
    state: LinkState,
    subscriptions: SubscriptionTable,
    delayed: DelayedQueue<LinkSupervisor<N, S>>,
    hooks: LinkHooks<N, S>,
    metrics: LinkMetrics,
}

impl<N, S> LinkSupervisor<N, S>
where
    N: NetworkDriver,
    S: SessionTransport,
{
    pub fn new(settings: LinkSettings, network: N, session: S) -> Self {
        Self::with_clock(settings, network, session, MonotonicClock::new())
    }

    pub fn with_clock(
        settings: LinkSettings,
        network: N,
        session: S,
        clock: impl Clock + 'static,
    ) -> Self {
        let subscriptions = SubscriptionTable::with_capacity(settings.max_subscriptions);
        let delayed = DelayedQueue::with_capacity(settings.max_delayed_tasks);

        Self {
            settings,
            network,
            session,
            clock: Box::new(clock),
            updater: None,
            state: LinkState::new(),
            subscriptions,
            delayed,
            hooks: LinkHooks::new(),
            metrics: LinkMetrics::new(),
        }
    }

    // ---- configuration ----

    /// Turn link event reporting on or off
    pub fn enable_debugging_messages(&mut self, enabled: bool) {
        self.settings.debug_messages = enabled;
    }

    /// Attach an update service using the configured update credentials
    ///
    /// Without explicit credentials the service gets the broker username and
    /// password (or empty strings) and the path `/`.
    pub fn enable_update_service(&mut self, service: impl UpdateService + 'static) -> LinkResult<()> {
        let credentials = self.settings.update.clone().unwrap_or_else(|| UpdateCredentials {
            path: "/".to_string(),
            username: self.settings.mqtt_username.clone().unwrap_or_default(),
            password: self.settings.mqtt_password.clone().unwrap_or_default(),
        });
        self.enable_update_service_with(service, credentials)
    }

    /// Attach an update service with explicit credentials; only once
    pub fn enable_update_service_with(
        &mut self,
        service: impl UpdateService + 'static,
        credentials: UpdateCredentials,
    ) -> LinkResult<()> {
        if self.updater.is_some() {
            let error = LinkError::UpdateServiceAlreadyEnabled;
            warn!("{error}");
            return Err(error);
        }

        let mut service: Box<dyn UpdateService> = Box::new(service);
        if self.state.network_associated {
            service.initialize(
                &self.settings.client_name,
                self.network.local_address(),
                &credentials,
            );
        }
        self.settings.update = Some(credentials.clone());
        self.updater = Some((service, credentials));
        Ok(())
    }

    /// Ask the broker to keep session state (clean-session off) from the next attempt
    pub fn enable_persistence(&mut self) {
        self.settings.clean_session = false;
    }

    pub fn enable_last_will(&mut self, topic: impl Into<String>, message: impl Into<String>, retain: bool) {
        self.settings.last_will = Some(LastWill {
            topic: topic.into(),
            message: message.into(),
            retain,
        });
    }

    /// Administrative switch for automatic session attempts
    pub fn enable_session_connect(&mut self, enabled: bool) {
        self.settings.auto_connect = enabled;
    }

    pub fn set_reconnect_policy(&mut self, policy: ReconnectConfig) {
        self.settings.reconnect = policy;
    }

    pub fn set_on_network_established<F>(&mut self, hook: F)
    where
        F: FnMut() + 'static,
    {
        self.hooks.network_established = Some(Box::new(hook));
    }

    pub fn set_on_network_lost<F>(&mut self, hook: F)
    where
        F: FnMut() + 'static,
    {
        self.hooks.network_lost = Some(Box::new(hook));
    }

    /// Replace the hook run on every session establishment
    ///
    /// Subscriptions do not survive a session loss, so this is where the
    /// application subscribes.
    pub fn set_on_session_established<F>(&mut self, hook: F)
    where
        F: FnMut(&mut LinkSupervisor<N, S>) + 'static,
    {
        self.hooks.session_established = Some(Box::new(hook));
    }

    pub fn set_on_session_lost<F>(&mut self, hook: F)
    where
        F: FnMut() + 'static,
    {
        self.hooks.session_lost = Some(Box::new(hook));
    }

    // ---- messaging ----

    /// Subscribe `pattern` with a payload-only handler
    pub fn subscribe<F>(&mut self, pattern: &str, handler: F) -> LinkResult<()>
    where
        F: FnMut(&str) + 'static,
    {
        self.subscribe_handler(pattern, SubscriptionHandler::payload(handler))
    }

    /// Subscribe `pattern` with a handler that also receives the concrete topic
    pub fn subscribe_with_topic<F>(&mut self, pattern: &str, handler: F) -> LinkResult<()>
    where
        F: FnMut(&str, &str) + 'static,
    {
        self.subscribe_handler(pattern, SubscriptionHandler::topic_and_payload(handler))
    }

    fn subscribe_handler(&mut self, pattern: &str, handler: SubscriptionHandler) -> LinkResult<()> {
        if let Err(error) = self.subscriptions.check_insert(pattern) {
            warn!("{error}");
            return Err(error);
        }

        if !self.session.subscribe_wire(pattern) {
            let error = LinkError::SubscribeFailed {
                pattern: pattern.to_string(),
            };
            warn!("{error}");
            return Err(error);
        }

        self.subscriptions.insert(pattern, handler)?;
        link_event!(self.settings.debug_messages, "Subscribed to [{}]", pattern);
        Ok(())
    }

    /// Drop the subscription for `pattern`
    ///
    /// The local entry is removed whenever it exists; the result reports
    /// whether the broker was told as well.
    pub fn unsubscribe(&mut self, pattern: &str) -> LinkResult<()> {
        if let Err(error) = self.subscriptions.remove(pattern) {
            warn!("{error}");
            return Err(error);
        }

        if self.session.unsubscribe_wire(pattern) {
            link_event!(self.settings.debug_messages, "Unsubscribed from [{}]", pattern);
            Ok(())
        } else {
            let error = LinkError::UnsubscribeFailed {
                pattern: pattern.to_string(),
            };
            warn!("{error}");
            Err(error)
        }
    }

    pub fn publish(&mut self, topic: &str, payload: impl AsRef<[u8]>, retain: bool) -> LinkResult<()> {
        let payload = payload.as_ref();
        let success = self.session.publish(topic, payload, retain);
        self.metrics.message_published(success);

        if success {
            link_event!(
                self.settings.debug_messages,
                "<< [{}] {}",
                topic,
                String::from_utf8_lossy(payload)
            );
            Ok(())
        } else {
            let error = LinkError::PublishFailed {
                topic: topic.to_string(),
            };
            warn!("{error}");
            Err(error)
        }
    }

    /// Run `task` once, on the first tick at least `delay_ms` from now
    pub fn execute_delayed<F>(&mut self, delay_ms: u64, task: F) -> LinkResult<()>
    where
        F: FnOnce(&mut LinkSupervisor<N, S>) + 'static,
    {
        let now = self.clock.now_ms();
        self.delayed.schedule(now, delay_ms, task).map_err(|error| {
            warn!("{error}");
            error
        })
    }

    // ---- reconciliation ----

    /// One pass of the reconciliation loop
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        let _span = crate::tick_span!(client = %self.settings.client_name).entered();
        self.metrics.tick();

        self.run_due_tasks(now);

        let associated = self.network.is_associated();
        let network_edge = Edge::between(self.state.network_associated, associated);
        self.state.network_associated = associated;

        match network_edge {
            Edge::Established => self.on_network_established(now),
            Edge::Lost => self.on_network_lost(),
            Edge::StableUp => {
                if let Some((service, _)) = self.updater.as_mut() {
                    service.service();
                }
            }
            Edge::StableDown => self.maybe_begin_association(now),
        }

        // Session work waits for a tick where the network level held still
        if network_edge.is_transition() {
            return;
        }

        let active = associated && self.session.is_session_active();
        let session_edge = Edge::between(self.state.session_established, active);
        self.state.session_established = active;

        match session_edge {
            Edge::Established => self.on_session_established(),
            Edge::Lost => self.on_session_lost(),
            Edge::StableUp => self.pump_session(),
            Edge::StableDown => {
                if associated {
                    self.maybe_begin_session(now);
                }
            }
        }
    }

    fn run_due_tasks(&mut self, now: u64) {
        let ran = DelayedQueue::drain_due(self, now, |link| &mut link.delayed);
        if ran > 0 {
            debug!(count = ran, "Ran delayed tasks");
            self.metrics.delayed_tasks_run(ran);
        }
    }

    fn on_network_established(&mut self, now: u64) {
        let address = self.network.local_address();
        self.state.record_network_success(now);
        self.metrics.network_established();

        match address {
            Some(address) => {
                link_event!(self.settings.debug_messages, %address, "Network connected, ip: {}", address)
            }
            None => link_event!(self.settings.debug_messages, "Network connected"),
        }

        if let Some((service, credentials)) = self.updater.as_mut() {
            service.initialize(&self.settings.client_name, address, credentials);
            link_event!(
                self.settings.debug_messages,
                path = %credentials.path,
                "Update service ready on {}",
                self.settings.client_name
            );
        }

        hooks::fire(&mut self.hooks.network_established);
    }

    fn on_network_lost(&mut self) {
        warn!("Network connection lost");
        self.metrics.network_lost();

        if self.settings.owns_network() {
            self.network.force_disassociate();
        }
        self.session.abandon();

        hooks::fire(&mut self.hooks.network_lost);
    }

    fn maybe_begin_association(&mut self, now: u64) {
        let Some(credentials) = self.settings.network.as_ref() else {
            return;
        };
        if !self.state.may_attempt_association() {
            return;
        }

        let _span = crate::link_span!(link = %LinkKind::Network, ssid = %credentials.ssid).entered();
        link_event!(
            self.settings.debug_messages,
            "Network: connecting to {} ...",
            credentials.ssid
        );
        self.network
            .begin_association(credentials, &self.settings.client_name);
        self.state.record_network_attempt(now);
        self.metrics.network_attempt();
    }

    fn on_session_established(&mut self) {
        self.state.record_session_established();
        self.metrics.session_established();
        link_event!(
            self.settings.debug_messages,
            count = self.state.established_count,
            "Session established"
        );

        // Run the hook with the supervisor lent to it; keep it unless it
        // installed a replacement while running.
        if let Some(mut hook) = self.hooks.session_established.take() {
            hook(self);
            if self.hooks.session_established.is_none() {
                self.hooks.session_established = Some(hook);
            }
        }
    }

    fn on_session_lost(&mut self) {
        warn!("Session lost");
        self.metrics.session_lost();
        self.subscriptions.deactivate_all();
        hooks::fire(&mut self.hooks.session_lost);
    }

    fn pump_session(&mut self) {
        let verbose = self.settings.debug_messages;
        let subscriptions = &mut self.subscriptions;
        let metrics = &mut self.metrics;

        self.session.pump(&mut |message: InboundMessage| {
            let payload = message.payload_text();
            link_event!(verbose, ">> [{}] {}", message.topic, payload);

            if message.is_truncated() {
                let error = LinkError::payload_truncated(
                    message.topic.as_str(),
                    message.received_len,
                    message.payload.len(),
                );
                warn!("{error}");
            }

            let handlers = subscriptions.dispatch(&message.topic, &payload);
            metrics.message_received(message.is_truncated(), handlers);
        });
    }

    fn maybe_begin_session(&mut self, now: u64) {
        if !self.settings.auto_connect {
            return;
        }

        let attempt = match self.state.session_retry_decision(now, &self.settings.reconnect) {
            RetryDecision::Proceed { attempt } => attempt,
            RetryDecision::Wait { .. } => return,
        };

        let params = self.session_params();
        let _span = crate::link_span!(link = %LinkKind::Session, attempt).entered();
        link_event!(
            self.settings.debug_messages,
            "Session: connecting as \"{}\" ...",
            params.client_id
        );

        let success = self.session.begin_session(&params);
        self.state.record_session_attempt(now);
        self.metrics.session_attempt(success);

        if success {
            link_event!(self.settings.debug_messages, "Session: connect request accepted");
        } else {
            let error = LinkError::connection_attempt_failed(
                LinkKind::Session,
                self.session.last_error_code(),
            );
            let retry_secs = self
                .settings
                .reconnect
                .calculate_backoff_delay(self.state.session_attempts)
                / 1000;
            warn!(attempt, "{error}, retrying in {retry_secs} seconds");
        }
    }

    /// Parameters for the next session attempt
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            client_id: self.client_id(),
            username: self.settings.mqtt_username.clone(),
            password: self.settings.mqtt_password.clone(),
            last_will: self.settings.last_will.clone(),
            clean_session: self.settings.clean_session,
        }
    }

    /// Client id sent to the broker
    pub fn client_id(&self) -> String {
        if self.settings.client_id_from_hardware_address {
            if let Some(mac) = self.network.hardware_address() {
                return mac.iter().map(|byte| format!("{byte:02X}")).collect();
            }
        }
        self.settings.client_name.clone()
    }

    // ---- observation ----

    /// Network associated and session established
    pub fn is_connected(&self) -> bool {
        self.state.network_associated && self.state.session_established
    }

    pub fn is_network_associated(&self) -> bool {
        self.state.network_associated
    }

    pub fn is_session_established(&self) -> bool {
        self.state.session_established
    }

    /// Number of session establishments since start
    pub fn established_count(&self) -> u32 {
        self.state.established_count
    }

    pub fn client_name(&self) -> &str {
        &self.settings.client_name
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    pub fn pending_delayed_tasks(&self) -> usize {
        self.delayed.len()
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            client_name: self.settings.client_name.clone(),
            network: self.state.network_phase(),
            session: self.state.session_phase(),
            established_count: self.state.established_count,
            subscriptions: self.subscriptions.len(),
            subscription_capacity: self.subscriptions.capacity(),
            delayed_tasks: self.delayed.len(),
            delayed_capacity: self.delayed.capacity(),
            metrics: self.metrics.snapshot(),
        }
    }
}

impl<N, S> std::fmt::Debug for LinkSupervisor<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSupervisor")
            .field("client_name", &self.settings.client_name)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions)
            .field("delayed", &self.delayed)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
