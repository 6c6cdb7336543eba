//! Network driver for hosts whose interfaces are managed by the OS
//!
//! The host is "associated" when it has a route to the broker: a UDP socket
//! can be connected to the broker address (no packet is sent). Joining or
//! leaving networks is the operating system's business, so association
//! requests are only logged.
//!
//! Name resolution blocks, so the broker address is cached and looked up
//! again at most once per resolve interval, however often the route fails.

use crate::transport::{NetworkCredentials, NetworkDriver};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum spacing between two lookups of the broker name
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(30);

/// Route-checking driver for an externally managed network
#[derive(Debug)]
pub struct HostNetwork {
    target_host: String,
    target_port: u16,
    resolved: Option<SocketAddr>,
    stale: bool,
    resolve_interval: Duration,
    last_resolved_at: Option<Instant>,
    resolutions: u64,
    local_address: Option<IpAddr>,
}

impl HostNetwork {
    /// Check for a route to `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            target_host: host.into(),
            target_port: port,
            resolved: None,
            stale: true,
            resolve_interval: DEFAULT_RESOLVE_INTERVAL,
            last_resolved_at: None,
            resolutions: 0,
            local_address: None,
        }
    }

    pub fn with_resolve_interval(mut self, interval: Duration) -> Self {
        self.resolve_interval = interval;
        self
    }

    /// Number of name lookups performed so far
    pub fn resolution_attempts(&self) -> u64 {
        self.resolutions
    }

    fn resolve_due(&self, now: Instant) -> bool {
        self.stale
            && self
                .last_resolved_at
                .map_or(true, |at| now.duration_since(at) >= self.resolve_interval)
    }

    /// Cached broker address, refreshed when stale and the interval allows
    fn target(&mut self) -> Option<SocketAddr> {
        let now = Instant::now();
        if self.resolve_due(now) {
            self.last_resolved_at = Some(now);
            self.resolutions += 1;

            match (self.target_host.as_str(), self.target_port)
                .to_socket_addrs()
                .map(|mut addrs| addrs.next())
            {
                Ok(Some(addr)) => {
                    self.resolved = Some(addr);
                    self.stale = false;
                }
                Ok(None) => debug!(host = %self.target_host, "Broker name resolved to no addresses"),
                Err(error) => debug!(host = %self.target_host, error = %error, "Broker name lookup failed"),
            }
        }
        self.resolved
    }

    fn route_from(target: SocketAddr) -> Option<IpAddr> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).ok()?;
        socket.connect(target).ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }
}

impl NetworkDriver for HostNetwork {
    fn is_associated(&mut self) -> bool {
        self.local_address = self.target().and_then(Self::route_from);
        if self.local_address.is_none() {
            // The name may have moved; look it up again once the interval passes
            self.stale = true;
        }
        self.local_address.is_some()
    }

    fn begin_association(&mut self, credentials: &NetworkCredentials, host_name: &str) {
        warn!(
            ssid = %credentials.ssid,
            host_name = %host_name,
            "Network association is managed by the host; waiting for a route"
        );
    }

    fn force_disassociate(&mut self) {
        debug!("Ignoring disassociate request for host-managed network");
        self.local_address = None;
    }

    fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }
}
