// vim: tw=80
//! One mock shared by several sessions.  Each session sees only its own
//! expectations.
use std::{
    sync::{Arc, Barrier},
    thread
};

use mockledger::*;

#[automock]
pub trait Foo {
    fn foo(&self) -> u32;
}

#[test]
fn bound_threads_use_their_own_ledger() {
    const N: u32 = 8;
    let mock = MockFoo::new();
    let barrier = Arc::new(Barrier::new(N as usize));
    let handles = (0..N).map(|i| {
        let mock = mock.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let ctrl = Controller::new();
            let _guard = ctrl.enter();
            ctrl.expect(mock.expect_foo().return_const(i));
            // Everybody declares before anybody calls
            barrier.wait();
            assert_eq!(i, mock.foo());
            barrier.wait();
            ctrl.finish()
        })
    }).collect::<Vec<_>>();
    for h in handles {
        assert!(h.join().unwrap().is_empty());
    }
    let m: &Mock = mock.as_ref();
    assert_eq!(0, m.live_expectations());
}

#[test]
fn unbound_thread_matches_any_session() {
    let ctrl = Controller::new();
    let mock = MockFoo::new();
    ctrl.expect(mock.expect_foo().return_const(5u32));
    let mock2 = mock.clone();
    let r = thread::spawn(move || mock2.foo()).join().unwrap();
    assert_eq!(5, r);
}

#[test]
fn records_do_not_leak() {
    let a = Controller::new();
    let b = Controller::builder().fail_on_drop(false).build();
    let mock = MockFoo::new();
    let m: &Mock = mock.as_ref();
    a.expect(mock.expect_foo().return_const(1u32));

    let e = m.dispatch::<(), u32>(&b.context(), "foo", ()).unwrap_err();
    match e {
        MockError::UnexpectedCall(uc) => assert!(uc.related.is_empty()),
        e => panic!("Wrong error {:?}", e)
    }
    assert_eq!(1, m.dispatch::<(), u32>(&a.context(), "foo", ()).unwrap());
}

#[test]
fn finished_session_no_longer_matches() {
    let mock = MockFoo::new();
    let m: &Mock = mock.as_ref();
    let ctrl = Controller::builder().fail_on_drop(false).build();
    ctrl.expect(mock.expect_foo().return_const(1u32));
    assert_eq!(1, ctrl.finish().len());
    let e = m.dispatch::<(), u32>(&CallContext::unbound(), "foo", ())
        .unwrap_err();
    assert!(e.is_unexpected_call());
}

#[test]
fn nested_bindings() {
    let outer = Controller::new();
    let inner = Controller::new();
    let mock = MockFoo::new();
    outer.expect(mock.expect_foo().return_const(1u32));
    inner.expect(mock.expect_foo().return_const(2u32));
    let _o = outer.enter();
    {
        let _i = inner.enter();
        assert_eq!(2, mock.foo());
    }
    assert_eq!(1, mock.foo());
}
