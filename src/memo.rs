//! The wrap façade: building memoized wrappers and driving their caches.
//!
//! [`wrap`] and [`MemoBuilder`] turn a work function into a [`Memo`] (or a
//! disposable [`Depend`]) with a private entry cache. A call derives the
//! cache key from its arguments, finds or creates the entry, lets the entry
//! decide between its cached outcome and a rerun, and finally trims the
//! cache. The eviction hook marks evicted entries dirty and releases their
//! subscriptions, so live parents of an evicted entry recompute instead of
//! trusting a stale reference.

use std::any::Any;
use std::rc::Rc;

use crate::cache::Lru;
use crate::context;
use crate::entry::{Entry, Outcome, Unsubscribe};
use crate::error::MemoError;
use crate::key::{default_cache_key, CacheKey, KeyArgs};
use crate::trace::{NoopTracer, Tracer};

struct MemoInner<A: 'static, T: 'static> {
    work: Box<dyn Fn(&A) -> Result<T, MemoError>>,
    make_key: Box<dyn Fn(&A) -> CacheKey>,
    subscribe: Option<Box<dyn Fn(&A) -> Unsubscribe>>,
    tracer: Rc<dyn Tracer>,
    cache: Lru<CacheKey, Rc<Entry>>,
}

impl<A: 'static, T: 'static> MemoInner<A, T> {
    fn lookup(&self, args: &A) -> Rc<Entry> {
        let key = (self.make_key)(args);
        if let Some(entry) = self.cache.get(&key) {
            return entry;
        }
        let entry = Rc::new(Entry::new(key));
        if let Some(subscribe) = &self.subscribe {
            entry.hold_subscription(subscribe(args));
        }
        self.cache.set(key, entry.clone());
        entry
    }

    fn invoke(&self, args: &A) -> Outcome {
        let entry = self.lookup(args);
        let outcome = entry.recompute(
            || (self.work)(args).map(|value| Rc::new(value) as Rc<dyn Any>),
            self.tracer.as_ref(),
        );
        self.cache.clean();
        outcome
    }

    fn dirty(&self, args: &A) {
        let key = (self.make_key)(args);
        if let Some(entry) = self.cache.peek(&key) {
            self.tracer.on_dirty(key);
            entry.set_dirty();
        }
    }

    fn has(&self, args: &A) -> bool {
        self.cache.has(&(self.make_key)(args))
    }

    fn forget(&self, args: &A) {
        let key = (self.make_key)(args);
        if let Some(entry) = self.cache.remove(&key) {
            self.tracer.on_evict(key);
            entry.dispose();
        }
    }
}

fn finish<T: 'static>(outcome: Outcome) -> Result<Rc<T>, MemoError> {
    outcome.map(|value| {
        value
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("cached outcome holds the wrapper's output type"))
    })
}

/// A memoized wrapper around a work function.
///
/// Results are cached per argument-derived key and shared via [`Rc`]. Calls
/// made by the work function to other wrappers are recorded as dependencies,
/// so dirtying a key invalidates everything that transitively used it.
///
/// Cloning is cheap and shares the cache.
///
/// # Example
///
/// ```
/// use memo_flow::wrap;
///
/// let double = wrap(|&n: &u32| Ok(n * 2));
/// assert_eq!(*double.call(7).unwrap(), 14);
/// assert!(double.has(7));
/// ```
pub struct Memo<A: 'static, T: 'static> {
    inner: Rc<MemoInner<A, T>>,
}

impl<A: 'static, T: 'static> Clone for Memo<A, T> {
    fn clone(&self) -> Self {
        Memo {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static, T: 'static> Memo<A, T> {
    /// Start building a wrapper with non-default options.
    pub fn builder(work: impl Fn(&A) -> Result<T, MemoError> + 'static) -> MemoBuilder<A, T>
    where
        A: KeyArgs,
    {
        MemoBuilder::new(work)
    }

    /// Memoized invocation: the cached outcome when the entry is clean,
    /// otherwise the work function runs. Cached failures are returned again
    /// until the key is dirtied.
    pub fn call(&self, args: A) -> Result<Rc<T>, MemoError> {
        finish(self.inner.invoke(&args))
    }

    /// Invalidate one key. The entry stays cached but is recomputed on next
    /// access; a missing key is a silent no-op.
    pub fn dirty(&self, args: A) {
        self.inner.dirty(&args);
    }

    /// Whether the cache currently holds this key. Touches neither recency
    /// nor the entry itself.
    pub fn has(&self, args: A) -> bool {
        self.inner.has(&args)
    }

    /// Drop one key from the cache, marking the departed entry dirty and
    /// releasing its subscription. A missing key is a silent no-op.
    pub fn forget(&self, args: A) {
        self.inner.forget(&args);
    }
}

/// A disposable wrapper: callers never see the result.
///
/// Invoked inside another wrapper's work function, [`Depend::depend`] caches
/// and tracks the computation like any dependency, so dirtying one of its
/// keys invalidates the callers that depended on it. Invoked outside any
/// wrapped call there is nothing to attach the dependency to, so nothing
/// runs and nothing is cached.
pub struct Depend<A: 'static, T: 'static> {
    inner: Rc<MemoInner<A, T>>,
}

impl<A: 'static, T: 'static> Clone for Depend<A, T> {
    fn clone(&self) -> Self {
        Depend {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static, T: 'static> Depend<A, T> {
    /// Register a dependency on this key from the currently-running wrapped
    /// call, computing it if needed. Outside any wrapped call this is a
    /// no-op returning `Ok(())`.
    pub fn depend(&self, args: A) -> Result<(), MemoError> {
        if !context::active() {
            return Ok(());
        }
        self.inner.invoke(&args).map(|_| ())
    }

    /// Invalidate one key; see [`Memo::dirty`].
    pub fn dirty(&self, args: A) {
        self.inner.dirty(&args);
    }

    /// Whether the cache currently holds this key; see [`Memo::has`].
    pub fn has(&self, args: A) -> bool {
        self.inner.has(&args)
    }

    /// Drop one key from the cache; see [`Memo::forget`].
    pub fn forget(&self, args: A) {
        self.inner.forget(&args);
    }
}

/// Builder for [`Memo`] and [`Depend`] wrappers.
///
/// Options are captured once at build time: the key function, the cache
/// bound, the external dirty-source subscription, and the tracer.
pub struct MemoBuilder<A: 'static, T: 'static> {
    work: Box<dyn Fn(&A) -> Result<T, MemoError>>,
    make_key: Box<dyn Fn(&A) -> CacheKey>,
    subscribe: Option<Box<dyn Fn(&A) -> Unsubscribe>>,
    tracer: Rc<dyn Tracer>,
    max: Option<usize>,
}

impl<A: KeyArgs + 'static, T: 'static> MemoBuilder<A, T> {
    /// Start from a work function; keys default to [`default_cache_key`],
    /// the cache defaults to unbounded, tracing to off.
    pub fn new(work: impl Fn(&A) -> Result<T, MemoError> + 'static) -> Self {
        MemoBuilder {
            work: Box::new(work),
            make_key: Box::new(|args| default_cache_key(args)),
            subscribe: None,
            tracer: Rc::new(NoopTracer),
            max: None,
        }
    }
}

impl<A: 'static, T: 'static> MemoBuilder<A, T> {
    /// Bound the cache; excess entries are evicted oldest-first after each
    /// call. Zero means unbounded.
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Replace the default key derivation.
    pub fn make_key(mut self, make_key: impl Fn(&A) -> CacheKey + 'static) -> Self {
        self.make_key = Box::new(make_key);
        self
    }

    /// Attach an external dirty source. `subscribe` runs once when an entry
    /// is created; the returned callback runs exactly once when the entry
    /// leaves the cache.
    pub fn subscribe(mut self, subscribe: impl Fn(&A) -> Unsubscribe + 'static) -> Self {
        self.subscribe = Some(Box::new(subscribe));
        self
    }

    /// Observe this wrapper's cache lifecycle.
    pub fn tracer(mut self, tracer: Rc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Build a memoized wrapper.
    pub fn build(self) -> Memo<A, T> {
        Memo {
            inner: self.into_inner(),
        }
    }

    /// Build a disposable wrapper.
    pub fn build_depend(self) -> Depend<A, T> {
        Depend {
            inner: self.into_inner(),
        }
    }

    fn into_inner(self) -> Rc<MemoInner<A, T>> {
        let tracer = self.tracer;
        let evictions = tracer.clone();
        let cache = Lru::with_dispose(self.max, move |entry: Rc<Entry>, key| {
            evictions.on_evict(key);
            entry.dispose();
        });
        Rc::new(MemoInner {
            work: self.work,
            make_key: self.make_key,
            subscribe: self.subscribe,
            tracer,
            cache,
        })
    }
}

/// Wrap a work function with default options: identity-derived keys, an
/// unbounded cache, no subscription, no tracing.
pub fn wrap<A, T>(work: impl Fn(&A) -> Result<T, MemoError> + 'static) -> Memo<A, T>
where
    A: KeyArgs + 'static,
    T: 'static,
{
    MemoBuilder::new(work).build()
}
