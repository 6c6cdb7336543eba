//! Topic subscription table and wildcard dispatch
//!
//! Entries live in a fixed-capacity arena with an explicit active count.
//! Insertion appends at the active boundary, removal compacts by index and
//! keeps the relative order of the rest. Insertion order is dispatch order.
//!
//! Deactivating the table (on session loss) only resets the active count:
//! the stale entries stay allocated past the boundary until new
//! subscriptions overwrite them.

use crate::error::{LinkError, LinkResult};

/// Handler attached to a subscription
///
/// Exactly one shape is chosen at subscribe time.
pub enum SubscriptionHandler {
    /// Called with the payload only
    Payload(Box<dyn FnMut(&str)>),
    /// Called with the concrete topic and the payload
    TopicAndPayload(Box<dyn FnMut(&str, &str)>),
}

impl SubscriptionHandler {
    pub fn payload<F>(handler: F) -> Self
    where
        F: FnMut(&str) + 'static,
    {
        SubscriptionHandler::Payload(Box::new(handler))
    }

    pub fn topic_and_payload<F>(handler: F) -> Self
    where
        F: FnMut(&str, &str) + 'static,
    {
        SubscriptionHandler::TopicAndPayload(Box::new(handler))
    }

    fn invoke(&mut self, topic: &str, payload: &str) {
        match self {
            SubscriptionHandler::Payload(handler) => handler(payload),
            SubscriptionHandler::TopicAndPayload(handler) => handler(topic, payload),
        }
    }
}

impl std::fmt::Debug for SubscriptionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionHandler::Payload(_) => write!(f, "SubscriptionHandler::Payload"),
            SubscriptionHandler::TopicAndPayload(_) => write!(f, "SubscriptionHandler::TopicAndPayload"),
        }
    }
}

/// One topic pattern and its handler
#[derive(Debug)]
pub struct SubscriptionEntry {
    pattern: String,
    handler: SubscriptionHandler,
}

impl SubscriptionEntry {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Fixed-capacity, insertion-ordered subscription table
#[derive(Debug)]
pub struct SubscriptionTable {
    entries: Vec<SubscriptionEntry>,
    active: usize,
    capacity: usize,
}

impl SubscriptionTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            active: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active subscriptions
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn is_full(&self) -> bool {
        self.active >= self.capacity
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    /// Active patterns in dispatch order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries[..self.active].iter().map(SubscriptionEntry::pattern)
    }

    /// Check that `pattern` could be inserted right now
    pub fn check_insert(&self, pattern: &str) -> LinkResult<()> {
        if self.is_full() {
            return Err(LinkError::capacity_exceeded(
                "subscription table",
                self.capacity,
            ));
        }
        if self.contains(pattern) {
            return Err(LinkError::duplicate_subscription(pattern));
        }
        Ok(())
    }

    /// Append a subscription; fails without mutation when full or duplicate
    pub fn insert(&mut self, pattern: &str, handler: SubscriptionHandler) -> LinkResult<()> {
        self.check_insert(pattern)?;

        let entry = SubscriptionEntry {
            pattern: pattern.to_string(),
            handler,
        };
        if self.active < self.entries.len() {
            self.entries[self.active] = entry;
        } else {
            self.entries.push(entry);
        }
        self.active += 1;
        Ok(())
    }

    /// Remove the entry for `pattern`, keeping the order of the rest
    pub fn remove(&mut self, pattern: &str) -> LinkResult<()> {
        let index = self
            .position(pattern)
            .ok_or_else(|| LinkError::not_found(pattern))?;

        // Shift the tail left; the removed entry lands just past the boundary
        self.entries[index..self.active].rotate_left(1);
        self.active -= 1;
        Ok(())
    }

    /// Mark every entry stale so the application has to subscribe again
    pub fn deactivate_all(&mut self) {
        self.active = 0;
    }

    /// Deliver a message to every matching handler in insertion order
    ///
    /// Returns the number of handlers invoked. A message may match several
    /// patterns and all of them run.
    pub fn dispatch(&mut self, topic: &str, payload: &str) -> usize {
        let mut invoked = 0;
        for entry in self.entries[..self.active].iter_mut() {
            if topic_matches(&entry.pattern, topic) {
                entry.handler.invoke(topic, payload);
                invoked += 1;
            }
        }
        invoked
    }

    fn position(&self, pattern: &str) -> Option<usize> {
        self.entries[..self.active]
            .iter()
            .position(|entry| entry.pattern == pattern)
    }
}

/// Match a concrete topic against a pattern holding at most one wildcard
///
/// `#` is a plain prefix/suffix test around the wildcard and does not have to
/// be the last level. `+` is the same test plus the requirement that the text
/// between prefix and suffix holds no `/`. When prefix and suffix overlap in
/// the topic, the overlapping text is checked instead.
/// Only the first wildcard is honoured, `#` taking precedence over `+`.
/// Patterns without wildcards match by string equality.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if let Some(index) = pattern.find('#') {
        let (prefix, suffix) = (&pattern[..index], &pattern[index + 1..]);
        topic.starts_with(prefix) && topic.ends_with(suffix)
    } else if let Some(index) = pattern.find('+') {
        let (prefix, suffix) = (&pattern[..index], &pattern[index + 1..]);
        if !(topic.starts_with(prefix) && topic.ends_with(suffix)) {
            return false;
        }
        let (start, end) = (prefix.len(), topic.len() - suffix.len());
        let between = if start <= end {
            &topic[start..end]
        } else {
            &topic[end..start]
        };
        !between.contains('/')
    } else {
        pattern == topic
    }
}
