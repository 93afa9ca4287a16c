// vim: tw=80
//! An expectation ledger for mock objects.
//!
//! mockledger creates mock versions of traits for use in tests.  A test
//! declares which calls it expects, with argument patterns, call counts and
//! ordering, against a [`Controller`].  The code under test then calls the
//! mock, and every call must match one outstanding expectation.  When the
//! controller checkpoints or finishes, every expectation must have been
//! called the required number of times.
//!
//! Unlike a mock that owns its expectations, a [`Mock`] keeps a separate
//! ledger for every controller that declared expectations on it.  So one mock
//! can be shared by tests running on several threads, each verifying only
//! its own calls.
//!
//! # User Guide
//!
//! * [`Getting started`](#getting-started)
//! * [`Return values`](#return-values)
//! * [`Matching arguments`](#matching-arguments)
//! * [`Call counts`](#call-counts)
//! * [`Ordering`](#ordering)
//! * [`Checkpoints`](#checkpoints)
//! * [`Atomic checks`](#atomic-checks)
//! * [`Parallel sessions`](#parallel-sessions)
//! * [`Configuration`](#configuration)
//! * [`Manual mocks`](#manual-mocks)
//!
//! ## Getting Started
//! ```
//! use mockledger::*;
//! #[automock]
//! trait MyTrait {
//!     fn foo(&self, x: u32) -> u32;
//! }
//!
//! fn call_with_four(x: &dyn MyTrait) -> u32 {
//!     x.foo(4)
//! }
//!
//! let ctrl = Controller::new();
//! let mock = MockMyTrait::new();
//! ctrl.expect(mock.expect_foo()
//!     .with_args((4,))
//!     .times(1)
//!     .returning(|(x,)| x + 1));
//! assert_eq!(5, call_with_four(&mock));
//! ctrl.finish();
//! ```
//!
//! Nothing is registered until the [`Call`] is declared with
//! [`Controller::expect`].  Expectations expect exactly one call unless told
//! otherwise.  Dropping the controller finishes it, and panics if any
//! failure was recorded.
//!
//! ## Return values
//!
//! Methods that return `()` need no programmed behavior.  Every other
//! expectation needs a return value, either a constant or a closure.  Closures
//! take the method's arguments as one tuple.
//!
//! ```
//! # use mockledger::*;
//! #[automock]
//! trait MyTrait {
//!     fn foo(&self) -> u32;
//!     fn bar(&self, x: u32, y: u32) -> u32;
//! }
//!
//! let ctrl = Controller::new();
//! let mock = MockMyTrait::new();
//! ctrl.expect(mock.expect_foo().return_const(42u32));
//! ctrl.expect(mock.expect_bar().returning(|(x, y)| x + y));
//! assert_eq!(42, mock.foo());
//! assert_eq!(7, mock.bar(3, 4));
//! ```
//!
//! Values that aren't `Clone` can be returned with [`Call::return_once`].
//! Values that aren't `Send` can be returned with [`Call::returning_st`],
//! as long as the mock is called from the thread that set the expectation.
//!
//! ## Matching arguments
//!
//! An argument pattern is any [`Predicate`] over the argument tuple.
//! [`params!`] builds one from one predicate per argument, and
//! [`Call::withf`] takes a plain function.
//!
//! ```
//! # use mockledger::*;
//! # use mockledger::predicate::*;
//! #[automock]
//! trait Sorter {
//!     fn less(&self, i: usize, j: usize) -> bool;
//! }
//!
//! let ctrl = Controller::builder().fail_on_drop(false).build();
//! let mock = MockSorter::new();
//! ctrl.expect(mock.expect_less()
//!     .with(params!(eq(1), eq(0)))
//!     .return_const(true));
//! ctrl.expect(mock.expect_less()
//!     .withf(|&(i, j)| i > j + 1)
//!     .return_const(false));
//! assert!(mock.less(1, 0));
//! assert!(!mock.less(5, 0));
//! ```
//!
//! When several expectations accept a call, the one declared first wins, so
//! successive return values can be scripted by declaring several
//! expectations.  See [`MatchPolicy`] for the alternative.
//!
//! A call that no expectation accepts is an unexpected call.  The diagnostic
//! lists every expectation declared for the same method, and why each one
//! didn't match:
//!
//! ```text
//! mock: unexpected call Sorter.less(2, 1)
//! (*) See Sorter.less defined at src/lib.rs:12:22 with (var == 1, var == 0), called 0 of 1 times
//!     Arguments didn't match:
//!       (var == 1, var == 0)
//!       ├── var == 1
//!       │   └── var: 2
//!       └── var == 0
//!           └── var: 1
//! ```
//!
//! ## Call counts
//!
//! [`Call::times`], [`Call::once`], [`Call::never`], [`Call::at_least`],
//! [`Call::at_most`], [`Call::times_any`] and [`Call::times_range`] set the
//! number of calls.  `at_least` and `at_most` keep the other bound.  Once an
//! expectation has been called its maximum number of times it no longer
//! matches.
//!
//! ```
//! # use mockledger::*;
//! #[automock]
//! trait Foo {
//!     fn foo(&self, x: u32);
//! }
//!
//! let ctrl = Controller::new();
//! let mock = MockFoo::new();
//! ctrl.expect(mock.expect_foo().times_range(1..3));
//! mock.foo(1);
//! mock.foo(2);
//! ```
//!
//! ## Ordering
//!
//! [`Call::after`] makes an expectation wait until another one has been
//! called at least once.  [`Call::before`] is the same relation seen from the
//! other side, and [`in_order!`] chains a whole sequence.  A prerequisite
//! must be declared before, or together with, the calls that depend on it.
//!
//! ```
//! # use mockledger::*;
//! #[automock]
//! trait Sorter {
//!     fn len(&self) -> usize;
//!     fn swap(&self, i: usize, j: usize);
//! }
//!
//! let ctrl = Controller::new();
//! let mock = MockSorter::new();
//! ctrl.expect(in_order![
//!     mock.expect_len().return_const(2usize),
//!     mock.expect_swap().with_args((0, 1))
//! ]);
//! assert_eq!(2, mock.len());
//! mock.swap(0, 1);
//! ```
//!
//! ## Checkpoints
//!
//! [`Controller::checkpoint`] verifies and discards every expectation
//! declared so far, returning the failures.  The session stays open for new
//! expectations.  [`Controller::finish`] closes it.
//!
//! ```
//! # use mockledger::*;
//! #[automock]
//! trait Foo {
//!     fn foo(&self);
//! }
//!
//! let ctrl = Controller::new();
//! let mock = MockFoo::new();
//! ctrl.expect(mock.expect_foo().times(2));
//! mock.foo();
//! let failures = ctrl.take_failures();
//! assert!(failures.is_empty());
//! let failures = ctrl.checkpoint();
//! assert!(failures[0].is_missing_call());
//! ctrl.take_failures();
//! ```
//!
//! ## Atomic checks
//!
//! [`Controller::atomic_check`] declares a set of expectations, exercises the
//! code under test and checkpoints, all as one step.  An unexpected call
//! aborts the exercise and is returned as a failure rather than failing the
//! test outright.  Expectations may name [`LockDomain`]s with
//! [`Call::locking`]; atomic checks that share a domain never overlap.
//!
//! ```
//! # use mockledger::*;
//! #[automock]
//! trait Foo {
//!     fn foo(&self);
//! }
//!
//! let ctrl = Controller::builder().fail_on_drop(false).build();
//! let mock = MockFoo::new();
//! let failures = ctrl.atomic_check(
//!     || { mock.foo(); mock.foo(); },
//!     mock.expect_foo()
//! ).unwrap();
//! assert_eq!(1, failures.len());
//! assert!(failures[0].is_unexpected_call());
//! ```
//!
//! ## Parallel sessions
//!
//! A thread that [enters](Controller::enter) a controller only matches that
//! controller's expectations.  A thread that hasn't entered any matches
//! against every open session.
//!
//! ```
//! # use mockledger::*;
//! # use std::thread;
//! #[automock]
//! trait Foo {
//!     fn foo(&self) -> u32;
//! }
//!
//! let mock = MockFoo::new();
//! let handles = (0..4u32).map(|i| {
//!     let mock = mock.clone();
//!     thread::spawn(move || {
//!         let ctrl = Controller::new();
//!         let _guard = ctrl.enter();
//!         ctrl.expect(mock.expect_foo().return_const(i));
//!         assert_eq!(i, mock.foo());
//!     })
//! }).collect::<Vec<_>>();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! ```
//!
//! ## Configuration
//!
//! [`Controller::builder`] returns a [`Config`]:
//!
//! * `fail_on_drop`: whether dropping the controller panics with its
//!   recorded failures.  Default `true`.
//! * `deadline`: cancel calls bound to the session after a timeout.
//! * `policy`: the [`MatchPolicy`].
//! * `reporter`: where failures go.  The default [`LogReporter`] emits them
//!   as `tracing` warnings.
//!
//! ## Manual mocks
//!
//! [`#[automock]`](automock) is sugar over [`Interface`] and [`Mock`].
//! Implementing those directly gives access to
//! [`Mock::dispatch`], which returns errors instead of panicking.
//!
//! ## Crate features
//!
//! * **nightly** - Enables `proc-macro2`'s nightly features in the derive
//!   crate.  Requires the nightly compiler.

extern crate self as mockledger;

mod call;
pub mod context;
mod controller;
mod descriptor;
mod error;
mod expectation;
mod lock;
mod mock;
pub mod registry;
mod report;
mod times;

pub use mockledger_derive::automock;
pub use predicates::prelude::{Predicate, predicate};

pub use crate::{
    call::{Assertion, Call, InOrder, Params},
    context::{Binding, CallContext, CancelToken},
    controller::{Config, Controller, MatchPolicy},
    descriptor::{Descriptor, MockId},
    error::{
        CancelReason,
        Cancelled,
        Failure,
        Mismatch,
        MissingCall,
        MockError,
        RelatedCall,
        UnexpectedCall,
        UsageError,
        is_unexpected_call,
        is_unexpected_call_payload,
        raise
    },
    expectation::Expectation,
    lock::LockDomain,
    mock::Mock,
    registry::{
        Args,
        Interface,
        MethodSignature,
        MethodTable,
        MethodTableBuilder,
        TypeRegistry
    },
    report::{LogReporter, Reporter},
    times::CountConstraint
};

/// Match each argument against its own predicate.
///
/// # Examples
/// ```
/// # use mockledger::*;
/// # use mockledger::predicate::*;
/// #[automock]
/// trait Foo {
///     fn foo(&self, x: u32, y: u32);
/// }
///
/// let ctrl = Controller::new();
/// let mock = MockFoo::new();
/// ctrl.expect(mock.expect_foo().with(params!(eq(42), gt(40))));
/// mock.foo(42, 43);
/// ```
#[macro_export]
macro_rules! params {
    ($($p:expr),* $(,)?) => {
        $crate::Params::new(($($p,)*))
    };
}

/// Chain assertions so that each one waits for the one before it.
///
/// The result is an [`InOrder`](crate::InOrder), which is declared as a
/// whole.
#[macro_export]
macro_rules! in_order {
    ($($a:expr),* $(,)?) => {
        $crate::InOrder::new(::std::vec![
            $(::std::boxed::Box::new($a)
                as ::std::boxed::Box<dyn $crate::Assertion>),*
        ])
    };
}

/// Group assertions without ordering them.
#[macro_export]
macro_rules! expectations {
    ($($a:expr),* $(,)?) => {
        ::std::vec![
            $(::std::boxed::Box::new($a)
                as ::std::boxed::Box<dyn $crate::Assertion>),*
        ]
    };
}

#[cfg(test)]
mod t {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Mock: Send, Sync, Clone);
    assert_impl_all!(Controller: Send, Sync);
    assert_impl_all!(Descriptor: Send, Sync);
    assert_impl_all!(Failure: Send, Sync, std::error::Error);
    assert_impl_all!(MockError: Send, Sync, std::error::Error);
    assert_impl_all!(Call<(u32,), u32>: Send, Sync, Clone);
}
