//! The connectivity core
//!
//! - [`tracker`] - link levels, timestamps, edges and retry decisions
//! - [`subscriptions`] - topic subscription table and wildcard dispatch
//! - [`delayed`] - bounded one-shot delayed tasks
//! - [`hooks`] - lifecycle hooks fired on edges
//! - [`supervisor`] - the reconciliation loop composing the above
//! - [`clock`] - millisecond time source

pub mod clock;
pub mod delayed;
pub mod hooks;
pub mod subscriptions;
pub mod supervisor;
pub mod tracker;

pub use clock::{Clock, MonotonicClock};
pub use delayed::{DelayedQueue, DelayedTask};
pub use hooks::{LinkHook, LinkHooks, SessionHook};
pub use subscriptions::{topic_matches, SubscriptionHandler, SubscriptionTable};
pub use supervisor::{LinkStatus, LinkSupervisor};
pub use tracker::{Edge, LinkPhase, LinkState, ReconnectConfig, RetryDecision};
