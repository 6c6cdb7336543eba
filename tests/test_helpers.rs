//! Test helpers and utilities for integration tests

use linkkeeper::testing::{ManualClock, MockNetwork, MockSession};
use linkkeeper::{LinkSettings, LinkSupervisor};

pub type TestLink = LinkSupervisor<MockNetwork, MockSession>;

/// A supervisor plus handles onto every collaborator it was built with
#[allow(dead_code)]
pub struct Harness {
    pub link: TestLink,
    pub network: MockNetwork,
    pub session: MockSession,
    pub clock: ManualClock,
}

#[allow(dead_code)]
impl Harness {
    /// Externally managed network, default capacities
    pub fn new() -> Self {
        Self::with_settings(LinkSettings::new("test-device"))
    }

    pub fn with_settings(settings: LinkSettings) -> Self {
        let network = MockNetwork::new();
        let session = MockSession::new();
        let clock = ManualClock::new(10_000);
        let link = LinkSupervisor::with_clock(settings, network.clone(), session.clone(), clock.clone());

        Self {
            link,
            network,
            session,
            clock,
        }
    }

    /// Tick until both links are up: network edge, session attempt, session edge
    pub fn connect(&mut self) {
        self.network.set_associated(true);
        self.link.tick();
        self.link.tick();
        self.link.tick();
        assert!(self.link.is_connected(), "harness failed to connect");
    }

    /// Advance the clock, then tick once
    pub fn tick_after(&mut self, ms: u64) {
        self.clock.advance(ms);
        self.link.tick();
    }
}
