//! Recursive re-entry is detected, surfaced, and never poisons an entry.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use memo_flow::{wrap, Memo};

#[test]
fn self_recursion_fails_with_the_cycle_error() {
    let calls = Rc::new(Cell::new(0));
    let handle: Rc<OnceCell<Memo<(), i32>>> = Rc::new(OnceCell::new());

    let count = calls.clone();
    let this = handle.clone();
    let looping = wrap(move |_: &()| {
        count.set(count.get() + 1);
        let looping = this.get().expect("initialized");
        Ok(*looping.call(())? + 1)
    });
    let _ = handle.set(looping.clone());

    let err = looping.call(()).unwrap_err();
    assert!(err.is_cycle());
    assert_eq!(err.to_string(), "already recomputing");
    assert_eq!(calls.get(), 1);

    // Dirtying after the failure must succeed.
    looping.dirty(());

    // The failure was not cached: the function runs again.
    let err = looping.call(()).unwrap_err();
    assert!(err.is_cycle());
    assert_eq!(calls.get(), 2);
}

#[test]
fn mutual_recursion_fails_with_the_cycle_error() {
    let ping_handle: Rc<OnceCell<Memo<(), i32>>> = Rc::new(OnceCell::new());
    let pong_handle: Rc<OnceCell<Memo<(), i32>>> = Rc::new(OnceCell::new());

    let other = pong_handle.clone();
    let ping = wrap(move |_: &()| Ok(*other.get().expect("initialized").call(())? + 1));
    let other = ping_handle.clone();
    let pong = wrap(move |_: &()| Ok(*other.get().expect("initialized").call(())? + 1));
    let _ = ping_handle.set(ping.clone());
    let _ = pong_handle.set(pong.clone());

    let err = ping.call(()).unwrap_err();
    assert_eq!(err.to_string(), "already recomputing");

    ping.dirty(());
    pong.dirty(());

    assert!(pong.call(()).unwrap_err().is_cycle());
}

#[test]
fn an_entry_recovers_once_the_cycle_is_broken() {
    let recurse = Rc::new(Cell::new(true));
    let handle: Rc<OnceCell<Memo<(), i32>>> = Rc::new(OnceCell::new());

    let flag = recurse.clone();
    let this = handle.clone();
    let guarded = wrap(move |_: &()| {
        if flag.get() {
            Ok(*this.get().expect("initialized").call(())? + 1)
        } else {
            Ok(10)
        }
    });
    let _ = handle.set(guarded.clone());

    assert!(guarded.call(()).unwrap_err().is_cycle());

    recurse.set(false);
    guarded.dirty(());
    assert_eq!(*guarded.call(()).unwrap(), 10);

    // And from here on it behaves like any cached entry.
    assert_eq!(*guarded.call(()).unwrap(), 10);
}

#[test]
fn cycle_failures_do_not_disturb_other_keys() {
    let handle: Rc<OnceCell<Memo<u8, u8>>> = Rc::new(OnceCell::new());

    let this = handle.clone();
    let chain = wrap(move |&n: &u8| {
        if n == 0 {
            // Key 0 loops back onto itself.
            return Ok(*this.get().expect("initialized").call(0)?);
        }
        Ok(n * 3)
    });
    let _ = handle.set(chain.clone());

    assert_eq!(*chain.call(2).unwrap(), 6);
    assert!(chain.call(0).unwrap_err().is_cycle());
    assert_eq!(*chain.call(2).unwrap(), 6);
    assert!(chain.has(2));
}
