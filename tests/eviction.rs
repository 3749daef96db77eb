//! Eviction and its coupling to dirtiness: bounded caches, dispose marking,
//! subscription release, deep recursion under a small bound.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

use memo_flow::{wrap, Memo, Unsubscribe};

#[test]
fn eviction_marks_dependents_dirty() {
    let child_salt = Rc::new(RefCell::new("*"));
    let parent_salt = Rc::new(RefCell::new("^"));

    let seasoning = child_salt.clone();
    let child = Memo::builder(move |&(s,): &(&'static str,)| {
        Ok(format!("{s}{}", seasoning.borrow()))
    })
    .max(1)
    .build();

    let seasoning = parent_salt.clone();
    let dependency = child.clone();
    let parent = wrap(move |&(s,): &(&'static str,)| {
        Ok(format!("{}{}", dependency.call((s,))?, seasoning.borrow()))
    });

    assert_eq!(*parent.call(("asdf",)).unwrap(), "asdf*^");

    *child_salt.borrow_mut() = "&";
    *parent_salt.borrow_mut() = "%";

    // Both salts changed, but the whole chain is still cached.
    assert_eq!(*parent.call(("asdf",)).unwrap(), "asdf*^");

    // This evicts "asdf" from the child's cache; the dispose hook marks the
    // departed entry dirty, which reaches the parent.
    assert_eq!(*child.call(("zxcv",)).unwrap(), "zxcv&");
    assert_eq!(*parent.call(("asdf",)).unwrap(), "asdf&%");
}

#[test]
fn deep_recursion_survives_eviction_of_mid_chain_ancestors() {
    let handle: Rc<OnceCell<Memo<u64, u64>>> = Rc::new(OnceCell::new());
    let this = handle.clone();
    let fib = Memo::builder(move |&n: &u64| {
        if n < 2 {
            return Ok(n);
        }
        let fib = this.get().expect("initialized");
        let a = *fib.call(n - 1)?;
        let b = *fib.call(n - 2)?;
        Ok(a + b)
    })
    .max(10)
    .build();
    let _ = handle.set(fib.clone());

    assert_eq!(*fib.call(78).unwrap(), 8_944_394_323_791_464);
    // Ancestors were evicted and dirtied mid-computation; a second call
    // recomputes but still agrees.
    assert_eq!(*fib.call(78).unwrap(), 8_944_394_323_791_464);
}

#[test]
fn subscriptions_are_released_exactly_once_on_eviction() {
    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let events = log.clone();
    let watched = Memo::builder(move |&(n,): &(u8,)| Ok(u16::from(n) * 2))
        .max(1)
        .subscribe(move |&(n,)| {
            events.borrow_mut().push(format!("subscribe {n}"));
            let events = events.clone();
            Box::new(move || events.borrow_mut().push(format!("unsubscribe {n}"))) as Unsubscribe
        })
        .build();

    watched.call((1,)).unwrap();
    assert_eq!(*log.borrow(), vec!["subscribe 1"]);

    // A cache hit neither re-subscribes nor unsubscribes.
    watched.call((1,)).unwrap();
    assert_eq!(log.borrow().len(), 1);

    watched.call((2,)).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["subscribe 1", "subscribe 2", "unsubscribe 1"]
    );

    // Recreating the evicted key subscribes afresh.
    watched.call((1,)).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "subscribe 1",
            "subscribe 2",
            "unsubscribe 1",
            "subscribe 1",
            "unsubscribe 2"
        ]
    );
}

#[test]
fn forget_drops_one_key_and_releases_its_subscription() {
    let calls = Rc::new(Cell::new(0));
    let unsubscribed = Rc::new(Cell::new(0));

    let count = calls.clone();
    let released = unsubscribed.clone();
    let id = Memo::builder(move |&n: &u32| {
        count.set(count.get() + 1);
        Ok(n)
    })
    .subscribe(move |_| {
        let released = released.clone();
        Box::new(move || released.set(released.get() + 1)) as Unsubscribe
    })
    .build();

    id.call(1).unwrap();
    id.call(2).unwrap();
    assert!(id.has(1));

    id.forget(1);
    assert!(!id.has(1));
    assert!(id.has(2));
    assert_eq!(unsubscribed.get(), 1);

    // Forgetting again is a silent no-op.
    id.forget(1);
    assert_eq!(unsubscribed.get(), 1);

    id.call(1).unwrap();
    assert_eq!(calls.get(), 3);
}

#[test]
fn forget_marks_dependents_dirty() {
    let child_calls = Rc::new(Cell::new(0));
    let parent_calls = Rc::new(Cell::new(0));

    let count = child_calls.clone();
    let child = wrap(move |&n: &u32| {
        count.set(count.get() + 1);
        Ok(n * 2)
    });

    let dependency = child.clone();
    let count = parent_calls.clone();
    let parent = wrap(move |&n: &u32| {
        count.set(count.get() + 1);
        Ok(*dependency.call(n)? + 1)
    });

    assert_eq!(*parent.call(4).unwrap(), 9);
    assert_eq!(*parent.call(4).unwrap(), 9);
    assert_eq!((child_calls.get(), parent_calls.get()), (1, 1));

    child.forget(4);
    assert_eq!(*parent.call(4).unwrap(), 9);
    assert_eq!((child_calls.get(), parent_calls.get()), (2, 2));
}

#[test]
fn least_recently_used_keys_age_out_first() {
    let calls = Rc::new(Cell::new(0));
    let count = calls.clone();
    let id = Memo::builder(move |&n: &u32| {
        count.set(count.get() + 1);
        Ok(n)
    })
    .max(2)
    .build();

    id.call(1).unwrap();
    id.call(2).unwrap();
    // Touch 1 so that 2 is the oldest.
    id.call(1).unwrap();
    id.call(3).unwrap();

    assert!(id.has(1));
    assert!(!id.has(2));
    assert!(id.has(3));

    id.call(1).unwrap();
    assert_eq!(calls.get(), 3);
    id.call(2).unwrap();
    assert_eq!(calls.get(), 4);
}
