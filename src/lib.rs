#![deny(missing_docs)]

//! memo-flow: reactive memoization with automatic dependency tracking.
//!
//! Wrapped functions cache their results per argument-derived key. While a
//! wrapped function recomputes, any wrapped calls it makes are recorded as
//! its dependencies, and invalidation propagates through the resulting
//! graph: dirtying one key marks everything that transitively used it, and
//! only those computations rerun on next access. Everything else stays
//! cached.
//!
//! # Key features
//!
//! - **Automatic dependency tracking**: no registration, just call one
//!   wrapper from another's work function.
//! - **Precise invalidation**: [`Memo::dirty`] invalidates one key and its
//!   transitive dependents, nothing else.
//! - **Bounded caches**: per-wrapper LRU with a dispose hook that keeps
//!   dependents correct under eviction.
//! - **Identity-derived keys**: the default key function treats arguments
//!   by identity, primitives by value and shared handles by address.
//! - **Failure caching**: a work function's error is cached and returned
//!   again until the key is dirtied; cycles are detected and surfaced, never
//!   cached.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use memo_flow::wrap;
//!
//! let source = Rc::new(RefCell::new(21u32));
//! let input = source.clone();
//! let base = wrap(move |_: &()| Ok(*input.borrow()));
//! let reader = base.clone();
//! let doubled = wrap(move |_: &()| Ok(*reader.call(())? * 2));
//!
//! assert_eq!(*doubled.call(()).unwrap(), 42);
//!
//! // Mutating the source alone changes nothing: the result is cached.
//! *source.borrow_mut() = 50;
//! assert_eq!(*doubled.call(()).unwrap(), 42);
//!
//! // Dirtying the base propagates to everything that depended on it.
//! base.dirty(());
//! assert_eq!(*doubled.call(()).unwrap(), 100);
//! ```

pub mod cache;
mod context;
mod entry;
mod error;
mod key;
mod memo;
pub mod trace;

pub use cache::Lru;
pub use entry::Unsubscribe;
pub use error::MemoError;
pub use key::{default_cache_key, CacheKey, KeyArg, KeyArgs, KeyAtom};
pub use memo::{wrap, Depend, Memo, MemoBuilder};
pub use trace::{CacheEvent, EventLog, NoopTracer, Tracer};
