//! Logging setup and link counters

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{LinkMetrics, MetricsSnapshot};

pub use logging::{link_event, link_span, tick_span};
