//! Observing cache behavior.
//!
//! This module defines the [`Tracer`] trait for observing what a wrapper
//! does with its cache. The default [`NoopTracer`] costs nothing when
//! tracing is not needed; [`EventLog`] accumulates [`CacheEvent`]s for
//! assertions in tests.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::key::CacheKey;

/// One observable step in a wrapper's cache lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// A call was answered from the cache.
    Hit {
        /// Key of the entry that answered.
        key: CacheKey,
    },
    /// A call ran the work function.
    Computed {
        /// Key of the entry that was recomputed.
        key: CacheKey,
    },
    /// A key was explicitly invalidated.
    Dirtied {
        /// Key of the invalidated entry.
        key: CacheKey,
    },
    /// An entry left the cache, by eviction or removal.
    Evicted {
        /// Key of the departed entry.
        key: CacheKey,
    },
}

/// Observer of a wrapper's cache lifecycle.
///
/// All methods default to no-ops, so implementations only override the
/// events they care about.
pub trait Tracer {
    /// A call was answered from the cache.
    fn on_hit(&self, key: CacheKey) {
        let _ = key;
    }

    /// A call is about to run the work function.
    fn on_compute(&self, key: CacheKey) {
        let _ = key;
    }

    /// A key was explicitly invalidated.
    fn on_dirty(&self, key: CacheKey) {
        let _ = key;
    }

    /// An entry left the cache.
    fn on_evict(&self, key: CacheKey) {
        let _ = key;
    }
}

/// The default tracer: observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Tracer that accumulates events for later inspection.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<CacheEvent>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected events, oldest first.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events.borrow().clone()
    }

    /// Take collected events, leaving the log empty.
    pub fn take(&self) -> Vec<CacheEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Drop all collected events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// True when nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl Tracer for EventLog {
    fn on_hit(&self, key: CacheKey) {
        self.events.borrow_mut().push(CacheEvent::Hit { key });
    }

    fn on_compute(&self, key: CacheKey) {
        self.events.borrow_mut().push(CacheEvent::Computed { key });
    }

    fn on_dirty(&self, key: CacheKey) {
        self.events.borrow_mut().push(CacheEvent::Dirtied { key });
    }

    fn on_evict(&self, key: CacheKey) {
        self.events.borrow_mut().push(CacheEvent::Evicted { key });
    }
}
