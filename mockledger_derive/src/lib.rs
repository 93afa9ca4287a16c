// vim: tw=80
//! Proc Macros for use with mockledger
//!
//! You probably don't want to use this crate directly.  Instead, use its
//! reexports via the [`mockledger`](../mockledger/index.html) crate.
extern crate proc_macro;

mod automock;
use crate::automock::do_automock;

/// Automatically generate a mock struct for a trait.
///
/// Given a trait `Foo`, generates a `MockFoo` struct next to it.  `MockFoo`
/// wraps a `mockledger::Mock`, implements `mockledger::Interface` and `Foo`,
/// and has one `expect_<method>` function per method of `Foo`.
///
/// Only `&self` methods whose arguments and return values are owned,
/// `'static` types can be mocked.  Generic traits, generic methods and
/// associated items are rejected at compile time.
///
/// See the [`mockledger`](../mockledger/index.html) crate for examples.
#[proc_macro_attribute]
pub fn automock(attrs: proc_macro::TokenStream, input: proc_macro::TokenStream)
    -> proc_macro::TokenStream
{
    do_automock(attrs.into(), input.into()).into()
}
