//! Bounded cache with a recency list and a dispose hook.
//!
//! [`Lru`] backs each wrapper's entry cache. It is a keyed map plus a
//! doubly-linked recency list ordered newest to oldest, implemented over an
//! index arena with a free list, so promotion on access is O(1) without
//! unsafe code.
//!
//! Eviction is deferred: [`Lru::set`] never evicts, and excess entries are
//! trimmed by [`Lru::clean`], which pops the oldest entry and runs the
//! dispose hook with no internal borrow held. A batch of inserts therefore
//! completes before any eviction callback runs, and dispose callbacks may
//! re-enter the cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Sentinel for absent links in the recency list.
const NIL: usize = usize::MAX;

struct Slot<K, V> {
    key: K,
    value: Option<V>,
    newer: usize,
    older: usize,
}

struct LruState<K, V> {
    map: HashMap<K, usize, ahash::RandomState>,
    arena: Vec<Slot<K, V>>,
    newest: usize,
    oldest: usize,
    free: usize,
}

/// A bounded map whose entries age out oldest-first.
///
/// `max` of `None` (or zero) means effectively unbounded: [`Lru::clean`]
/// never evicts. Every method takes `&self`; state lives behind a `RefCell`
/// that is released before the dispose hook runs.
pub struct Lru<K: 'static, V: 'static> {
    max: usize,
    dispose: Box<dyn Fn(V, K)>,
    state: RefCell<LruState<K, V>>,
}

impl<K: 'static, V: 'static> fmt::Debug for Lru<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lru")
            .field("max", &self.max)
            .field("len", &self.state.borrow().map.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone + 'static, V: 'static> Lru<K, V> {
    /// Create a cache with no dispose hook.
    pub fn new(max: Option<usize>) -> Self {
        Self::with_dispose(max, |_, _| {})
    }

    /// Create a cache whose evictions invoke `dispose(value, key)`.
    pub fn with_dispose(max: Option<usize>, dispose: impl Fn(V, K) + 'static) -> Self {
        let max = match max {
            Some(0) | None => usize::MAX,
            Some(max) => max,
        };
        Lru {
            max,
            dispose: Box::new(dispose),
            state: RefCell::new(LruState {
                map: HashMap::default(),
                arena: Vec::new(),
                newest: NIL,
                oldest: NIL,
                free: NIL,
            }),
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.borrow().map.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().map.is_empty()
    }

    /// The bound enforced by [`Lru::clean`].
    pub fn max(&self) -> usize {
        self.max
    }

    /// Look up a key, promoting it to newest. Returns a clone of the value.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let mut state = self.state.borrow_mut();
        let idx = state.map.get(key).copied()?;
        state.promote(idx);
        state.arena[idx].value.clone()
    }

    /// Look up a key without touching recency.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let state = self.state.borrow();
        let idx = state.map.get(key).copied()?;
        state.arena[idx].value.clone()
    }

    /// Presence check without promotion.
    pub fn has(&self, key: &K) -> bool {
        self.state.borrow().map.contains_key(key)
    }

    /// Insert or overwrite, promoting the key to newest, and return the
    /// value just stored. Never evicts; call [`Lru::clean`] to trim. An
    /// overwritten value is dropped, not disposed.
    pub fn set(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        let mut state = self.state.borrow_mut();
        if let Some(idx) = state.map.get(&key).copied() {
            state.arena[idx].value = Some(value.clone());
            state.promote(idx);
            return value;
        }
        let idx = state.alloc(key.clone(), value.clone());
        state.link_newest(idx);
        state.map.insert(key, idx);
        value
    }

    /// Remove a key, unlinking it from the recency list. The dispose hook is
    /// not invoked; the value is returned to the caller instead.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.borrow_mut();
        let idx = state.map.remove(key)?;
        state.unlink(idx);
        let value = state.arena[idx].value.take();
        state.release(idx);
        value
    }

    /// Evict oldest entries until the bound holds, invoking the dispose hook
    /// once per evicted entry. Each hook call runs after the cache state has
    /// been updated and all internal borrows released.
    pub fn clean(&self) {
        loop {
            let evicted = {
                let mut state = self.state.borrow_mut();
                if state.map.len() <= self.max {
                    break;
                }
                state.pop_oldest()
            };
            match evicted {
                Some((key, value)) => (self.dispose)(value, key),
                None => break,
            }
        }
    }

    /// Cached keys ordered newest to oldest.
    pub fn keys(&self) -> Vec<K> {
        let state = self.state.borrow();
        let mut keys = Vec::with_capacity(state.map.len());
        let mut idx = state.newest;
        while idx != NIL {
            keys.push(state.arena[idx].key.clone());
            idx = state.arena[idx].older;
        }
        keys
    }
}

impl<K: Hash + Eq + Clone, V> LruState<K, V> {
    fn alloc(&mut self, key: K, value: V) -> usize {
        let slot = Slot {
            key,
            value: Some(value),
            newer: NIL,
            older: NIL,
        };
        if self.free != NIL {
            let idx = self.free;
            self.free = self.arena[idx].older;
            self.arena[idx] = slot;
            idx
        } else {
            self.arena.push(slot);
            self.arena.len() - 1
        }
    }

    fn release(&mut self, idx: usize) {
        self.arena[idx].older = self.free;
        self.free = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let newer = self.arena[idx].newer;
        let older = self.arena[idx].older;
        if newer != NIL {
            self.arena[newer].older = older;
        } else {
            self.newest = older;
        }
        if older != NIL {
            self.arena[older].newer = newer;
        } else {
            self.oldest = newer;
        }
        self.arena[idx].newer = NIL;
        self.arena[idx].older = NIL;
    }

    fn link_newest(&mut self, idx: usize) {
        self.arena[idx].newer = NIL;
        self.arena[idx].older = self.newest;
        if self.newest != NIL {
            self.arena[self.newest].newer = idx;
        }
        self.newest = idx;
        if self.oldest == NIL {
            self.oldest = idx;
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.newest == idx {
            return;
        }
        self.unlink(idx);
        self.link_newest(idx);
    }

    fn pop_oldest(&mut self) -> Option<(K, V)> {
        if self.oldest == NIL {
            return None;
        }
        let idx = self.oldest;
        let key = self.arena[idx].key.clone();
        let value = self.arena[idx].value.take();
        self.unlink(idx);
        self.map.remove(&key);
        self.release(idx);
        value.map(|value| (key, value))
    }
}
