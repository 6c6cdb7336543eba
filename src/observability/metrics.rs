//! Link counters
//!
//! Each supervisor owns one [`LinkMetrics`]; the tick loop is single-threaded
//! so plain counters are enough. [`LinkMetrics::snapshot`] produces a
//! serializable copy for status output.

use serde::Serialize;

/// Counters for one supervisor
#[derive(Debug, Clone, Default)]
pub struct LinkMetrics {
    ticks: u64,
    network_attempts: u64,
    network_established: u64,
    network_lost: u64,
    session_attempts: u64,
    session_established: u64,
    session_failures: u64,
    session_lost: u64,
    messages_received: u64,
    messages_truncated: u64,
    messages_dispatched: u64,
    messages_published: u64,
    publish_failures: u64,
    delayed_tasks_run: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn network_attempt(&mut self) {
        self.network_attempts += 1;
    }

    pub fn network_established(&mut self) {
        self.network_established += 1;
    }

    pub fn network_lost(&mut self) {
        self.network_lost += 1;
    }

    pub fn session_attempt(&mut self, success: bool) {
        self.session_attempts += 1;
        if !success {
            self.session_failures += 1;
        }
    }

    pub fn session_established(&mut self) {
        self.session_established += 1;
    }

    pub fn session_lost(&mut self) {
        self.session_lost += 1;
    }

    /// One inbound message and the number of handlers it reached
    pub fn message_received(&mut self, truncated: bool, handlers: usize) {
        self.messages_received += 1;
        if truncated {
            self.messages_truncated += 1;
        }
        self.messages_dispatched += handlers as u64;
    }

    pub fn message_published(&mut self, success: bool) {
        if success {
            self.messages_published += 1;
        } else {
            self.publish_failures += 1;
        }
    }

    pub fn delayed_tasks_run(&mut self, count: usize) {
        self.delayed_tasks_run += count as u64;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks,
            network: NetworkMetrics {
                attempts: self.network_attempts,
                established: self.network_established,
                lost: self.network_lost,
            },
            session: SessionMetrics {
                attempts: self.session_attempts,
                established: self.session_established,
                failures: self.session_failures,
                lost: self.session_lost,
            },
            messages: MessageMetrics {
                received: self.messages_received,
                truncated: self.messages_truncated,
                dispatched: self.messages_dispatched,
                published: self.messages_published,
                publish_failures: self.publish_failures,
            },
            delayed_tasks_run: self.delayed_tasks_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub network: NetworkMetrics,
    pub session: SessionMetrics,
    pub messages: MessageMetrics,
    pub delayed_tasks_run: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkMetrics {
    pub attempts: u64,
    pub established: u64,
    pub lost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    pub attempts: u64,
    pub established: u64,
    pub failures: u64,
    pub lost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub truncated: u64,
    /// Handler invocations across all received messages
    pub dispatched: u64,
    pub published: u64,
    pub publish_failures: u64,
}
