// vim: tw=80
//! Declaring, matching and verifying expectations on a small sorting
//! interface
use std::panic;

use mockledger::*;
use mockledger::predicate::*;

#[automock]
pub trait Sorter {
    fn len(&self) -> usize;
    fn less(&self, i: usize, j: usize) -> bool;
    fn swap(&self, i: usize, j: usize);
}

fn quiet() -> Controller {
    Controller::builder().fail_on_drop(false).build()
}

#[test]
fn len_exactly_once() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    let m: &Mock = mock.as_ref();
    ctrl.expect(mock.expect_len().return_const(3usize));
    let ctx = ctrl.context();
    assert_eq!(3, m.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
    let e = m.dispatch::<(), usize>(&ctx, "len", ()).unwrap_err();
    assert!(is_unexpected_call(&e));
    match e {
        MockError::UnexpectedCall(uc) => {
            assert_eq!(1, uc.related.len());
            assert_eq!(1, uc.related[0].count);
            assert!(matches!(uc.related[0].mismatch, Mismatch::Exhausted));
        },
        e => panic!("Wrong error {:?}", e)
    }
    assert!(ctrl.finish().is_empty());
}

#[test]
fn less_lists_related_expectation() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    let m: &Mock = mock.as_ref();
    let call = mock.expect_less()
        .with(params!(eq(1), eq(0)))
        .return_const(true);
    ctrl.expect(call.clone());
    ctrl.expect(mock.expect_len().return_const(2usize).times_any());

    let e = m.dispatch::<(usize, usize), bool>(&ctrl.context(), "less", (2, 1))
        .unwrap_err();
    let uc = match e {
        MockError::UnexpectedCall(uc) => uc,
        e => panic!("Wrong error {:?}", e)
    };
    assert_eq!("Sorter", uc.interface);
    assert_eq!("less", uc.method);
    assert_eq!(1, uc.related.len());
    assert_eq!(call.descriptor(), &uc.related[0].descriptor);
    assert_eq!(0, uc.related[0].count);
    let s = uc.to_string();
    assert!(s.starts_with("mock: unexpected call Sorter.less(2, 1)\n(*) See \
                          Sorter.less defined at "), "{}", s);
    assert!(s.contains("with (var == 1, var == 0), called 0 of 1 times"),
            "{}", s);
    assert!(s.contains("Arguments didn't match"), "{}", s);

    assert!(mock.less(1, 0));
    assert!(ctrl.finish().is_empty());
}

#[test]
fn in_order() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    let m: &Mock = mock.as_ref();
    let c1 = mock.expect_len().return_const(2usize);
    let c2 = mock.expect_less().return_const(false);
    let c3 = mock.expect_swap();
    ctrl.expect(in_order![c1.clone(), c2, c3]);

    let e = m.dispatch::<(usize, usize), bool>(&ctrl.context(), "less", (0, 1))
        .unwrap_err();
    match e {
        MockError::UnexpectedCall(uc) => match &uc.related[0].mismatch {
            Mismatch::Ordering(pending) =>
                assert_eq!(&vec![c1.descriptor().clone()], pending),
            other => panic!("Wrong mismatch {:?}", other)
        },
        e => panic!("Wrong error {:?}", e)
    }

    assert_eq!(2, mock.len());
    assert!(!mock.less(0, 1));
    mock.swap(0, 1);
    assert!(ctrl.finish().is_empty());
}

#[test]
fn redeclare_is_idempotent() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    let m: &Mock = mock.as_ref();
    let call = mock.expect_len().return_const(3usize);
    let a = ctrl.declare(&call).unwrap();
    let b = ctrl.declare(&call.clone()).unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(1, m.live_expectations());

    assert_eq!(3, mock.len());
    assert_eq!(1, b.count());
    assert!(a.is_satisfied());
    assert!(ctrl.finish().is_empty());
}

#[test]
fn equal_calls_are_distinct() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    let m: &Mock = mock.as_ref();
    ctrl.expect(mock.expect_len().return_const(1usize));
    ctrl.expect(mock.expect_len().return_const(2usize));
    assert_eq!(2, m.live_expectations());
    assert_eq!(1, mock.len());
    assert_eq!(2, mock.len());
    assert!(ctrl.finish().is_empty());
}

#[test]
fn finish_twice() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    ctrl.expect(mock.expect_swap().times(2));
    mock.swap(0, 1);
    let failures = ctrl.finish();
    assert_eq!(1, failures.len());
    assert!(ctrl.finish().is_empty());
    assert_eq!(1, ctrl.failures().len());
}

#[test]
fn unexpected_call_payload() {
    let ctrl = quiet();
    let mock = MockSorter::new();
    ctrl.expect(mock.expect_swap().with_args((0, 1)));
    let r = panic::catch_unwind(panic::AssertUnwindSafe(|| mock.swap(1, 0)));
    let payload = r.unwrap_err();
    assert!(is_unexpected_call_payload(&*payload));
    let e = payload.downcast_ref::<MockError>().unwrap();
    assert!(e.to_string().starts_with("mock: unexpected call Sorter.swap(1, 0)"));
    mock.swap(0, 1);
}
