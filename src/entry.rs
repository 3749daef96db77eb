//! Entries and the recomputation protocol.
//!
//! An [`Entry`] is one memoized (function, key) record: its last outcome,
//! its dirty and recomputing state, and its position in the dependency
//! graph. Entries are owned by their wrapper's cache and, while their work
//! function runs, by the call frame; graph edges are weak in both
//! directions. Which of two entries acts as parent can flip between
//! independent top-level calls, so no edge may own: otherwise entries of
//! mutually dependent wrappers could keep each other alive forever.
//!
//! The protocol, in short: a clean entry returns its cached outcome and
//! reports itself to the parent that invoked it; an effectively dirty entry
//! forgets its children, reruns the work function under a pushed context
//! frame, stores the outcome, and then reports to the parent captured at
//! call entry, not whatever the stack top happens to be afterwards. Dirty
//! marks flow the other way: a dirtied entry notifies each parent that still
//! regards it as clean, and the notification keeps climbing only while it
//! flips a previously clean ancestor.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use crate::context;
use crate::error::MemoError;
use crate::key::CacheKey;
use crate::trace::Tracer;

/// Callback releasing an external dirty-source subscription.
pub type Unsubscribe = Box<dyn FnOnce()>;

/// A cached outcome: the produced value or the failure, type-erased the same
/// way for both so one cache slot carries either.
pub(crate) type Outcome = Result<Rc<dyn Any>, MemoError>;

/// Process-unique entry identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryId(u64);

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(0);

impl EntryId {
    fn next() -> Self {
        EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type EdgeMap<V> = IndexMap<EntryId, V, ahash::RandomState>;

pub(crate) struct Entry {
    id: EntryId,
    key: CacheKey,
    value: RefCell<Option<Outcome>>,
    dirty: Cell<bool>,
    recomputing: Cell<bool>,
    /// Entries that invoked this one during their last recomputation.
    parents: RefCell<EdgeMap<Weak<Entry>>>,
    /// Entries this one invoked during its last recomputation.
    children: RefCell<EdgeMap<Weak<Entry>>>,
    /// Children known to be dirty. Non-empty means this entry is effectively
    /// dirty even when its own flag is clear.
    dirty_children: RefCell<IndexSet<EntryId, ahash::RandomState>>,
    subscription: RefCell<Option<Unsubscribe>>,
}

impl Entry {
    pub(crate) fn new(key: CacheKey) -> Self {
        Entry {
            id: EntryId::next(),
            key,
            value: RefCell::new(None),
            dirty: Cell::new(true),
            recomputing: Cell::new(false),
            parents: RefCell::new(EdgeMap::default()),
            children: RefCell::new(EdgeMap::default()),
            dirty_children: RefCell::new(IndexSet::default()),
            subscription: RefCell::new(None),
        }
    }

    pub(crate) fn hold_subscription(&self, unsubscribe: Unsubscribe) {
        *self.subscription.borrow_mut() = Some(unsubscribe);
    }

    /// True when the cached outcome can no longer be trusted.
    pub(crate) fn might_be_dirty(&self) -> bool {
        self.dirty.get() || !self.dirty_children.borrow().is_empty()
    }

    /// Produce this entry's current outcome, cached or by running `work`.
    pub(crate) fn recompute(
        self: Rc<Self>,
        work: impl FnOnce() -> Outcome,
        tracer: &dyn Tracer,
    ) -> Outcome {
        if self.recomputing.get() {
            return Err(MemoError::Cycle);
        }
        let parent = context::current();
        if !self.might_be_dirty() {
            tracer.on_hit(self.key);
            let outcome = self
                .value
                .borrow()
                .clone()
                .expect("clean entry holds an outcome");
            if let Some(parent) = &parent {
                remember_child(parent, &self);
            }
            return outcome;
        }

        tracer.on_compute(self.key);
        self.forget_children();
        // Cleared up front so a dirty mark landing mid-run survives the
        // store below and takes effect on the next call.
        self.dirty.set(false);
        let outcome = {
            let _frame = RecomputeFrame::enter(&self);
            work()
        };
        if matches!(outcome, Err(MemoError::Cycle)) {
            // Cycle failures are surfaced, never cached: the entry keeps its
            // pre-cycle state and stays dirty for the next call.
            self.dirty.set(true);
            return outcome;
        }
        *self.value.borrow_mut() = Some(outcome.clone());
        if let Some(parent) = &parent {
            remember_child(parent, &self);
        }
        outcome
    }

    /// Mark this entry dirty and notify parents that held it as clean.
    pub(crate) fn set_dirty(&self) {
        let was_clean = !self.might_be_dirty();
        self.dirty.set(true);
        if was_clean {
            self.notify_parents_dirty();
        }
    }

    /// Eviction hook: the outcome can no longer be handed out, and the
    /// external dirty source no longer has anyone to notify.
    pub(crate) fn dispose(&self) {
        self.set_dirty();
        // The borrow ends before the callback runs; it may re-enter.
        let unsubscribe = self.subscription.borrow_mut().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    /// A child of this entry became dirty.
    fn note_child_dirty(&self, child: EntryId) {
        if self.dirty_children.borrow().contains(&child) {
            return;
        }
        let was_clean = !self.might_be_dirty();
        self.dirty_children.borrow_mut().insert(child);
        if was_clean {
            self.notify_parents_dirty();
        }
    }

    fn notify_parents_dirty(&self) {
        let parents: Vec<Rc<Entry>> = self
            .parents
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for parent in parents {
            parent.note_child_dirty(self.id);
        }
    }

    /// Drop all child edges ahead of a rerun; the rerun re-registers the
    /// children it actually invokes.
    fn forget_children(&self) {
        let children: Vec<Rc<Entry>> = self
            .children
            .borrow_mut()
            .drain(..)
            .filter_map(|(_, child)| child.upgrade())
            .collect();
        for child in &children {
            child.parents.borrow_mut().shift_remove(&self.id);
        }
        self.dirty_children.borrow_mut().clear();
    }
}

/// Record `child` as a dependency of `parent`, routed by the child's current
/// state: a clean child is remembered as clean, a dirty one lands in the
/// parent's dirty set. Both sides of the edge are weak; ownership stays
/// with the wrappers' caches.
fn remember_child(parent: &Rc<Entry>, child: &Rc<Entry>) {
    child
        .parents
        .borrow_mut()
        .insert(parent.id, Rc::downgrade(parent));
    parent
        .children
        .borrow_mut()
        .insert(child.id, Rc::downgrade(child));
    if child.might_be_dirty() {
        parent.note_child_dirty(child.id);
    } else {
        parent.dirty_children.borrow_mut().shift_remove(&child.id);
    }
}

/// Frame guard around a running work function: marks the entry recomputing
/// and pushes it as the current parent, undoing both on drop so a panicking
/// work function cannot leak a frame or wedge the entry.
struct RecomputeFrame {
    entry: Rc<Entry>,
}

impl RecomputeFrame {
    fn enter(entry: &Rc<Entry>) -> Self {
        entry.recomputing.set(true);
        context::push(entry.clone());
        RecomputeFrame {
            entry: entry.clone(),
        }
    }
}

impl Drop for RecomputeFrame {
    fn drop(&mut self) {
        context::pop();
        self.entry.recomputing.set(false);
    }
}
