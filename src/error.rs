//! Error taxonomy for the link supervisor
//!
//! Every failure here is local: a call that fails reports the reason and
//! returns `Err`, the supervisor itself never fails. Connection failures and
//! payload truncation are built as values only so they can be reported.

use crate::transport::SessionErrorCode;
use std::fmt;
use thiserror::Error;

/// Which side of the link an error or event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Network,
    Session,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Network => write!(f, "network"),
            LinkKind::Session => write!(f, "session"),
        }
    }
}

/// Main error type for link supervisor operations
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{table} is full ({capacity} entries), ignored")]
    CapacityExceeded {
        table: &'static str,
        capacity: usize,
    },

    #[error("Subscribed to [{pattern}] already, ignored")]
    DuplicateSubscription { pattern: String },

    #[error("Topic [{pattern}] cannot be found to unsubscribe, ignored")]
    NotFound { pattern: String },

    #[error("{link} connection attempt failed, reason: {reason}")]
    ConnectionAttemptFailed {
        link: LinkKind,
        reason: SessionErrorCode,
    },

    #[error("Message on [{topic}] truncated from {received} to {delivered} bytes")]
    PayloadTruncated {
        topic: String,
        received: usize,
        delivered: usize,
    },

    #[error("Publish to [{topic}] failed, is the message too long?")]
    PublishFailed { topic: String },

    #[error("Subscribe to [{pattern}] failed")]
    SubscribeFailed { pattern: String },

    #[error("Unsubscribe from [{pattern}] failed")]
    UnsubscribeFailed { pattern: String },

    #[error("Update service can only be enabled once")]
    UpdateServiceAlreadyEnabled,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl LinkError {
    /// Create capacity exceeded error
    pub fn capacity_exceeded(table: &'static str, capacity: usize) -> Self {
        Self::CapacityExceeded { table, capacity }
    }

    /// Create duplicate subscription error
    pub fn duplicate_subscription<S: Into<String>>(pattern: S) -> Self {
        Self::DuplicateSubscription {
            pattern: pattern.into(),
        }
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(pattern: S) -> Self {
        Self::NotFound {
            pattern: pattern.into(),
        }
    }

    /// Create connection attempt failed error
    pub fn connection_attempt_failed(link: LinkKind, reason: SessionErrorCode) -> Self {
        Self::ConnectionAttemptFailed { link, reason }
    }

    /// Create payload truncated error
    pub fn payload_truncated<S: Into<String>>(topic: S, received: usize, delivered: usize) -> Self {
        Self::PayloadTruncated {
            topic: topic.into(),
            received,
            delivered,
        }
    }
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_constructor() {
        let error = LinkError::capacity_exceeded("subscription table", 10);
        assert!(matches!(error, LinkError::CapacityExceeded { .. }));
        assert_eq!(
            error.to_string(),
            "subscription table is full (10 entries), ignored"
        );
    }

    #[test]
    fn test_duplicate_subscription_constructor() {
        let error = LinkError::duplicate_subscription("sensors/#");
        assert!(matches!(error, LinkError::DuplicateSubscription { .. }));
        assert_eq!(
            error.to_string(),
            "Subscribed to [sensors/#] already, ignored"
        );
    }

    #[test]
    fn test_not_found_constructor() {
        let error = LinkError::not_found("a/b");
        assert!(matches!(error, LinkError::NotFound { .. }));
        assert!(error.to_string().contains("[a/b]"));
    }

    #[test]
    fn test_connection_attempt_failed_names_reason() {
        let error = LinkError::connection_attempt_failed(
            LinkKind::Session,
            SessionErrorCode::BadCredentials,
        );
        assert_eq!(
            error.to_string(),
            "session connection attempt failed, reason: MQTT_CONNECT_BAD_CREDENTIALS"
        );
    }

    #[test]
    fn test_payload_truncated_reports_sizes() {
        let error = LinkError::payload_truncated("big/topic", 400, 238);
        let text = error.to_string();
        assert!(text.contains("400"));
        assert!(text.contains("238"));
    }

    #[test]
    fn test_link_kind_display() {
        assert_eq!(LinkKind::Network.to_string(), "network");
        assert_eq!(LinkKind::Session.to_string(), "session");
    }
}
