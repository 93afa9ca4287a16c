// vim: tw=80
//! Checkpoints report every expectation whose count is out of range
use mockledger::*;
use proptest::prelude::*;

#[automock]
pub trait Counter {
    fn hit(&self);
    fn miss(&self);
}

#[test]
fn all_violations_reported() {
    let ctrl = Controller::builder().fail_on_drop(false).build();
    let mock = MockCounter::new();
    let a = ctrl.declare(&mock.expect_hit().times(2)).unwrap();
    ctrl.expect(mock.expect_miss().at_least(1));
    ctrl.expect(mock.expect_hit().times_any());
    mock.hit();

    let failures = ctrl.checkpoint();
    assert_eq!(2, failures.len());
    match &failures[0] {
        Failure::MissingCall(mc) => {
            assert_eq!(a.descriptor(), &mc.descriptor);
            assert_eq!(1, mc.count);
            assert_eq!(CountConstraint::exactly(2), mc.constraint);
        },
        f => panic!("Wrong failure {:?}", f)
    }
    let s = failures[1].to_string();
    assert!(s.starts_with("mock: missing call(s) to Counter.miss defined at "),
            "{}", s);
    assert!(s.ends_with(": expected 1.. time(s), called 0 time(s)"), "{}", s);
}

#[test]
#[should_panic(expected = "mock: missing call(s) to Counter.hit")]
fn fail_on_drop() {
    let ctrl = Controller::new();
    let mock = MockCounter::new();
    ctrl.expect(mock.expect_hit());
}

#[test]
fn never() {
    let ctrl = Controller::builder().fail_on_drop(false).build();
    let mock = MockCounter::new();
    let m: &Mock = mock.as_ref();
    ctrl.expect(mock.expect_hit().never());
    let e = m.dispatch::<(), ()>(&ctrl.context(), "hit", ()).unwrap_err();
    assert!(e.is_unexpected_call());
    assert!(ctrl.finish().is_empty());
}

proptest! {
    #[test]
    fn reported_iff_outside(min in proptest::option::of(0usize..5),
                            max in proptest::option::of(0usize..5),
                            calls in 0usize..8)
    {
        let constraint = CountConstraint::new(min, max);
        prop_assume!(!constraint.is_inverted());
        let ctrl = Controller::builder().fail_on_drop(false).build();
        let mock = MockCounter::new();
        let m: &Mock = mock.as_ref();
        let e = ctrl.declare(&mock.expect_hit().times_range(constraint))
            .unwrap();
        for _ in 0..calls {
            // Calls beyond the maximum are unexpected; ignore them.
            let _ = m.dispatch::<(), ()>(&ctrl.context(), "hit", ());
        }
        let count = e.count();
        prop_assert!(max.map_or(true, |max| count <= max));
        let failures = ctrl.checkpoint();
        prop_assert_eq!(!constraint.contains(count), failures.len() == 1);
        prop_assert!(failures.len() <= 1);
        if let Some(Failure::MissingCall(mc)) = failures.first() {
            prop_assert_eq!(count, mc.count);
            prop_assert_eq!(constraint, mc.constraint);
        }
    }
}
