//! Subscription table for routing inbound requests by pattern.
//!
//! Each pattern (already carrying the instance prefix) maps to a non-empty
//! queue of handlers. Patterns are compared as raw bytes. Lookups rotate the queue so repeated requests for the
//! same pattern are spread over its handlers in insertion order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cloudi_api::handler::{Outcome, SubscriptionTable};
//! use cloudi_api::{Client, Request};
//!
//! fn noop(_: &mut Client, _: &Request) -> cloudi_api::handler::HandlerResult {
//!     Ok(Outcome::Normal)
//! }
//!
//! let mut table = SubscriptionTable::new();
//! table.insert("/prefix/jobs", Arc::new(noop));
//! assert!(table.find("/prefix/jobs").is_some());
//!
//! assert!(table.erase("/prefix/jobs"));
//! assert!(!table.erase("/prefix/jobs"));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::Handler;

/// Pattern to handler queue.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: HashMap<Vec<u8>, VecDeque<Arc<dyn Handler>>>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the queue for `pattern`, creating it if needed.
    pub fn insert(&mut self, pattern: impl AsRef<[u8]>, handler: Arc<dyn Handler>) {
        self.entries
            .entry(pattern.as_ref().to_vec())
            .or_default()
            .push_back(handler);
    }

    /// Remove every handler for `pattern`; returns whether it was present.
    pub fn erase(&mut self, pattern: impl AsRef<[u8]>) -> bool {
        self.entries.remove(pattern.as_ref()).is_some()
    }

    /// Next handler for `pattern`, advancing the rotation.
    ///
    /// Returns `None` for a pattern that was never inserted (or was erased).
    pub fn find(&mut self, pattern: impl AsRef<[u8]>) -> Option<Arc<dyn Handler>> {
        let queue = self.entries.get_mut(pattern.as_ref())?;
        if queue.len() == 1 {
            return queue.front().cloned();
        }
        let handler = queue.pop_front()?;
        queue.push_back(Arc::clone(&handler));
        Some(handler)
    }

    /// Check if `pattern` has any handlers.
    pub fn contains(&self, pattern: impl AsRef<[u8]>) -> bool {
        self.entries.contains_key(pattern.as_ref())
    }

    /// Number of subscribed patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no pattern is subscribed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of handlers queued for `pattern`.
    pub fn handler_count(&self, pattern: impl AsRef<[u8]>) -> usize {
        self.entries.get(pattern.as_ref()).map_or(0, VecDeque::len)
    }
}

impl std::fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k), v.len())),
            )
            .finish()
    }
}
