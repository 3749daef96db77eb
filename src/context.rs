//! Thread-local stack of currently-recomputing entries.
//!
//! The top of the stack is the parent that receives dependency reports from
//! wrapped calls made while a work function runs. Each wrapped call captures
//! the current top at entry and pushes/pops around its own work function, so
//! a call chain only ever observes its own frames: a top-level call that
//! begins while another computation is parked never sees the parked frame as
//! its parent.

use std::cell::RefCell;
use std::rc::Rc;

use crate::entry::Entry;

thread_local! {
    static RECOMPUTE_STACK: RefCell<Vec<Rc<Entry>>> = RefCell::new(Vec::new());
}

/// The entry whose work function is currently executing, if any.
pub(crate) fn current() -> Option<Rc<Entry>> {
    RECOMPUTE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// True while any work function is executing on this thread.
pub(crate) fn active() -> bool {
    RECOMPUTE_STACK.with(|stack| !stack.borrow().is_empty())
}

pub(crate) fn push(entry: Rc<Entry>) {
    RECOMPUTE_STACK.with(|stack| stack.borrow_mut().push(entry));
}

pub(crate) fn pop() {
    RECOMPUTE_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;

    #[test]
    fn stack_is_lifo() {
        assert!(current().is_none());
        assert!(!active());

        let outer = Rc::new(Entry::new(CacheKey::of(&"outer")));
        let inner = Rc::new(Entry::new(CacheKey::of(&"inner")));

        push(outer.clone());
        assert!(active());
        assert!(Rc::ptr_eq(&current().unwrap(), &outer));

        push(inner.clone());
        assert!(Rc::ptr_eq(&current().unwrap(), &inner));

        pop();
        assert!(Rc::ptr_eq(&current().unwrap(), &outer));
        pop();
        assert!(current().is_none());
    }
}
