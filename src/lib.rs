//! linkkeeper - self-healing network and MQTT session supervision
//!
//! A single-threaded, polled supervisor that keeps a device's network
//! association and broker session alive. Call [`LinkSupervisor::tick`]
//! repeatedly; each tick runs due delayed tasks, reconciles the network and
//! then the session, and fires lifecycle hooks on edges. Subscriptions are
//! dispatched to handlers with `+`/`#` wildcard matching and are dropped on
//! session loss, so the application re-subscribes from the session-established
//! hook.
//!
//! # Quick Start
//!
//! ```rust
//! use linkkeeper::testing::{ManualClock, MockNetwork, MockSession};
//! use linkkeeper::{LinkSettings, LinkSupervisor};
//!
//! let network = MockNetwork::new();
//! let session = MockSession::new();
//! let clock = ManualClock::new(0);
//!
//! let mut link = LinkSupervisor::with_clock(
//!     LinkSettings::new("porch-light"),
//!     network.clone(),
//!     session.clone(),
//!     clock.clone(),
//! );
//! link.set_on_session_established(|link| {
//!     let _ = link.subscribe("porch/#", |payload| println!("got {payload}"));
//! });
//!
//! network.set_associated(true);
//! link.tick(); // network established
//! link.tick(); // session attempt
//! link.tick(); // session established, hook subscribes
//! assert!(link.is_connected());
//! assert_eq!(link.subscriptions().len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{LinkConfig, LinkSettings};
pub use error::{LinkError, LinkKind, LinkResult};
pub use link::{topic_matches, LinkStatus, LinkSupervisor, ReconnectConfig};
pub use transport::{NetworkDriver, SessionErrorCode, SessionTransport, UpdateService};
