// vim: tw=80
//! Building expectations: argument patterns, call counts, ordering and
//! behaviors
use std::{
    collections::BTreeSet,
    fmt,
    mem,
    panic::Location,
    sync::{Arc, Mutex, PoisonError}
};

use fragile::Fragile;
use predicates::reflection::{Case, PredicateReflection};
use predicates_tree::CaseTreeExt;

use crate::{
    Controller,
    CountConstraint,
    Descriptor,
    Expectation,
    LockDomain,
    Mock,
    MockError,
    Predicate,
    UsageError,
    expectation::AnyRule,
    predicate,
    registry::Args
};

/// Return functions for expectations
enum Rfunc<A, R> {
    Default,
    // Indicates that a `return_once` expectation has already returned
    Expired,
    Mut(Box<dyn FnMut(A) -> R + Send>),
    // Should be Box<dyn FnOnce> once that feature is stabilized
    // https://github.com/rust-lang/rust/issues/28796
    Once(Box<dyn FnMut(A) -> R + Send>),
}

impl<A, R: 'static> Rfunc<A, R> {
    fn call_mut(&mut self, args: A, desc: &Descriptor) -> Result<R, UsageError>
    {
        match self {
            Rfunc::Default => {
                // Methods returning () need no programmed behavior
                let unit: Box<dyn std::any::Any> = Box::new(());
                unit.downcast::<R>()
                    .map(|r| *r)
                    .map_err(|_| UsageError::NoBehavior(desc.clone()))
            },
            Rfunc::Expired => Err(UsageError::BehaviorExpired(desc.clone())),
            Rfunc::Mut(f) => Ok(f(args)),
            Rfunc::Once(_) => {
                let fo = mem::replace(self, Rfunc::Expired);
                if let Rfunc::Once(mut f) = fo {
                    Ok(f(args))
                } else {
                    unreachable!()
                }
            },
        }
    }
}

enum Matcher<A> {
    Always,
    Func(Box<dyn Fn(&A) -> bool + Send>),
    Pred(Box<dyn Predicate<A> + Send>),
}

impl<A> Matcher<A> {
    fn matches(&self, args: &A) -> bool {
        match self {
            Matcher::Always => true,
            Matcher::Func(f) => f(args),
            Matcher::Pred(p) => p.eval(args),
        }
    }

    /// Explain why `args` were rejected, if the pattern can tell.
    fn explain(&self, args: &A) -> Option<String> {
        match self {
            Matcher::Pred(p) => p.find_case(false, args)
                .map(|case| case.tree().to_string()),
            _ => None
        }
    }
}

impl<A> fmt::Display for Matcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Always => f.write_str("<anything>"),
            Matcher::Func(_) => f.write_str("<function>"),
            Matcher::Pred(p) => write!(f, "{}", p),
        }
    }
}

/// The typed part of an expectation: what it accepts and what it does.
#[doc(hidden)]
pub struct Rule<A, R> {
    matcher: Mutex<Matcher<A>>,
    rfunc: Mutex<Rfunc<A, R>>,
}

impl<A: Args, R: 'static> Rule<A, R> {
    fn new() -> Self {
        Rule {
            matcher: Mutex::new(Matcher::Always),
            rfunc: Mutex::new(Rfunc::Default),
        }
    }

    fn set_matcher(&self, m: Matcher<A>) {
        *self.matcher.lock().unwrap_or_else(PoisonError::into_inner) = m;
    }

    fn set_rfunc(&self, r: Rfunc<A, R>) {
        *self.rfunc.lock().unwrap_or_else(PoisonError::into_inner) = r;
    }

    pub(crate) fn matches(&self, args: &A) -> bool {
        self.matcher.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matches(args)
    }

    pub(crate) fn explain(&self, args: &A) -> Option<String> {
        self.matcher.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .explain(args)
    }

    /// Run the programmed behavior.
    pub(crate) fn call(&self, args: A, desc: &Descriptor)
        -> Result<R, UsageError>
    {
        self.rfunc.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call_mut(args, desc)
    }
}

impl<A: Args, R: 'static> AnyRule for Rule<A, R> {
    fn pattern(&self) -> String {
        self.matcher.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_string()
    }
}

/// Something that can be declared against a [`Controller`]: a single
/// [`Call`], an [`InOrder`] chain, or a `Vec` of boxed assertions (see
/// [`expectations!`](crate::expectations)).
pub trait Assertion {
    /// Declare every expectation in this assertion.
    fn setup(&self, controller: &Controller) -> Result<(), MockError>;

    /// Make the entry points of this assertion wait for `prerequisites`.
    fn require_after(&self, prerequisites: &[Descriptor]);

    /// Expectations that must be called before whatever follows this
    /// assertion in an ordered chain.
    fn tails(&self) -> Vec<Descriptor>;

    /// Exclusive resources needed while this assertion is exercised
    fn lock_domains(&self) -> Vec<LockDomain>;
}

impl<T: Assertion + ?Sized> Assertion for Box<T> {
    fn setup(&self, controller: &Controller) -> Result<(), MockError> {
        (**self).setup(controller)
    }

    fn require_after(&self, prerequisites: &[Descriptor]) {
        (**self).require_after(prerequisites)
    }

    fn tails(&self) -> Vec<Descriptor> {
        (**self).tails()
    }

    fn lock_domains(&self) -> Vec<LockDomain> {
        (**self).lock_domains()
    }
}

impl<T: Assertion + ?Sized> Assertion for &T {
    fn setup(&self, controller: &Controller) -> Result<(), MockError> {
        (**self).setup(controller)
    }

    fn require_after(&self, prerequisites: &[Descriptor]) {
        (**self).require_after(prerequisites)
    }

    fn tails(&self) -> Vec<Descriptor> {
        (**self).tails()
    }

    fn lock_domains(&self) -> Vec<LockDomain> {
        (**self).lock_domains()
    }
}

/// An unordered group.  Every member is declared, in order.
impl Assertion for Vec<Box<dyn Assertion>> {
    fn setup(&self, controller: &Controller) -> Result<(), MockError> {
        self.iter().try_for_each(|a| a.setup(controller))
    }

    fn require_after(&self, prerequisites: &[Descriptor]) {
        for a in self.iter() {
            a.require_after(prerequisites);
        }
    }

    fn tails(&self) -> Vec<Descriptor> {
        self.iter().flat_map(|a| a.tails()).collect()
    }

    fn lock_domains(&self) -> Vec<LockDomain> {
        self.iter().flat_map(|a| a.lock_domains()).collect()
    }
}

/// One expected call to one method of one mock.
///
/// Built by the generated `expect_<method>` functions or by
/// [`Mock::expect`].  Nothing is registered until the `Call` is declared
/// against a [`Controller`].  Clones share the same identity, so declaring a
/// clone in the same session returns the existing expectation.
///
/// Unless told otherwise, a `Call` expects exactly one call with any
/// arguments.
pub struct Call<A: Args, R: 'static> {
    mock: Mock,
    desc: Descriptor,
    count: Option<CountConstraint>,
    after: Arc<Mutex<BTreeSet<Descriptor>>>,
    domains: Vec<LockDomain>,
    rule: Arc<Rule<A, R>>,
}

impl<A: Args, R: 'static> Call<A, R> {
    #[track_caller]
    pub fn new(mock: &Mock, method: &'static str) -> Self {
        Self::new_at(mock, method, Location::caller())
    }

    #[doc(hidden)]
    pub fn new_at(mock: &Mock,
                  method: &'static str,
                  location: &'static Location<'static>) -> Self
    {
        let desc = Descriptor::new(mock.id(), mock.interface(), method,
                                   location);
        Call {
            mock: mock.clone(),
            desc,
            count: None,
            after: Arc::default(),
            domains: Vec::new(),
            rule: Arc::new(Rule::new()),
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn method(&self) -> &'static str {
        self.desc.method()
    }

    pub fn mock(&self) -> &Mock {
        &self.mock
    }

    /// The effective call count constraint
    pub fn count_constraint(&self) -> CountConstraint {
        self.count.unwrap_or(CountConstraint::exactly(1))
    }

    pub(crate) fn prerequisites(&self) -> Vec<Descriptor> {
        self.after.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub(crate) fn rule(&self) -> Arc<Rule<A, R>> {
        self.rule.clone()
    }

    /// Declare this expectation against `controller`.
    pub fn declare(&self, controller: &Controller)
        -> Result<Expectation, MockError>
    {
        self.mock.declare_expectation(controller, self)
    }

    /// Expect exactly `n` calls.
    pub fn times(mut self, n: usize) -> Self {
        self.count = Some(CountConstraint::exactly(n));
        self
    }

    /// Shortcut for [`times(1)`](#method.times).
    pub fn once(self) -> Self {
        self.times(1)
    }

    /// Forbid this expectation from ever being called.
    pub fn never(self) -> Self {
        self.times(0)
    }

    /// Allow any number of calls, including none.
    pub fn times_any(mut self) -> Self {
        self.count = Some(CountConstraint::unbounded());
        self
    }

    /// Require at least `n` calls.  Keeps any upper bound already set.
    pub fn at_least(mut self, n: usize) -> Self {
        let c = self.count.unwrap_or_default();
        self.count = Some(c.with_min(n));
        self
    }

    /// Allow at most `n` calls.  Keeps any lower bound already set.
    pub fn at_most(mut self, n: usize) -> Self {
        let c = self.count.unwrap_or_default();
        self.count = Some(c.with_max(n));
        self
    }

    /// Allow a number of calls within `range`, e.g. `1..3`, `2..`, `..=4`.
    pub fn times_range<C: Into<CountConstraint>>(mut self, range: C) -> Self {
        self.count = Some(range.into());
        self
    }

    /// Set the argument pattern.
    ///
    /// The pattern is a [`Predicate`] over the whole argument tuple.  Use
    /// [`params!`](crate::params) to give one predicate per argument.
    pub fn with<P>(self, p: P) -> Self
        where P: Predicate<A> + Send + 'static
    {
        self.rule.set_matcher(Matcher::Pred(Box::new(p)));
        self
    }

    /// Set a matching function over the argument tuple.
    pub fn withf<F>(self, f: F) -> Self
        where F: Fn(&A) -> bool + Send + 'static
    {
        self.rule.set_matcher(Matcher::Func(Box::new(f)));
        self
    }

    /// Match only this exact argument tuple.
    pub fn with_args(self, args: A) -> Self
        where A: PartialEq
    {
        self.with(predicate::eq(args))
    }

    /// Supply a closure that computes the return value from the arguments.
    pub fn returning<F>(self, f: F) -> Self
        where F: FnMut(A) -> R + Send + 'static
    {
        self.rule.set_rfunc(Rfunc::Mut(Box::new(f)));
        self
    }

    /// Single-threaded version of [`returning`](#method.returning).  Can be
    /// used when the arguments or return type aren't `Send`.
    ///
    /// It is a runtime error to call the mock method from a different thread
    /// than the one that originally called this method.
    pub fn returning_st<F>(self, f: F) -> Self
        where F: FnMut(A) -> R + 'static
    {
        let mut fragile = Fragile::new(f);
        let fmut = move |args: A| {
            (fragile.get_mut())(args)
        };
        self.rule.set_rfunc(Rfunc::Mut(Box::new(fmut)));
        self
    }

    /// Supply an `FnOnce` closure.  Useful for return types that aren't
    /// `Clone`.  Calling the expectation a second time is a usage error.
    pub fn return_once<F>(self, f: F) -> Self
        where F: FnOnce(A) -> R + Send + 'static
    {
        let mut fopt = Some(f);
        let fmut = move |args: A| {
            match fopt.take() {
                Some(f) => f(args),
                // Rfunc::call_mut swaps in Expired before a second call
                None => unreachable!()
            }
        };
        self.rule.set_rfunc(Rfunc::Once(Box::new(fmut)));
        self
    }

    /// Return a clone of `value` on every call.
    pub fn return_const<T>(self, value: T) -> Self
        where T: Clone + Into<R> + Send + 'static
    {
        self.returning(move |_| value.clone().into())
    }

    /// This call may only match once `other` has been called at least once.
    pub fn after<T: Assertion + ?Sized>(self, other: &T) -> Self {
        self.require_after(&other.tails());
        self
    }

    /// `other` may only match once this call has been called at least once.
    /// Sugar for `other.after(self)`.
    pub fn before<T: Assertion + ?Sized>(self, other: &T) -> Self {
        other.require_after(&[self.desc.clone()]);
        self
    }

    /// Hold `domain` for the duration of any atomic check that declares this
    /// call.
    pub fn locking(mut self, domain: &LockDomain) -> Self {
        self.domains.push(domain.clone());
        self
    }
}

impl<A: Args, R: 'static> Clone for Call<A, R> {
    fn clone(&self) -> Self {
        Call {
            mock: self.mock.clone(),
            desc: self.desc.clone(),
            count: self.count,
            after: self.after.clone(),
            domains: self.domains.clone(),
            rule: self.rule.clone(),
        }
    }
}

impl<A: Args, R: 'static> fmt::Debug for Call<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("descriptor", &self.desc)
            .field("pattern", &self.rule.pattern())
            .field("count", &self.count_constraint())
            .finish()
    }
}

impl<A: Args, R: 'static> Assertion for Call<A, R> {
    fn setup(&self, controller: &Controller) -> Result<(), MockError> {
        self.declare(controller).map(drop)
    }

    fn require_after(&self, prerequisites: &[Descriptor]) {
        self.after.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(prerequisites.iter().cloned());
    }

    fn tails(&self) -> Vec<Descriptor> {
        vec![self.desc.clone()]
    }

    fn lock_domains(&self) -> Vec<LockDomain> {
        self.domains.clone()
    }
}

/// A chain of assertions that must be called in the given order.  Each
/// element waits for the one before it.
///
/// Usually built with [`in_order!`](crate::in_order).
pub struct InOrder(Vec<Box<dyn Assertion>>);

impl InOrder {
    pub fn new(steps: Vec<Box<dyn Assertion>>) -> Self {
        for i in 1..steps.len() {
            let prev = steps[i - 1].tails();
            steps[i].require_after(&prev);
        }
        InOrder(steps)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Assertion for InOrder {
    fn setup(&self, controller: &Controller) -> Result<(), MockError> {
        self.0.setup(controller)
    }

    fn require_after(&self, prerequisites: &[Descriptor]) {
        if let Some(first) = self.0.first() {
            first.require_after(prerequisites);
        }
    }

    fn tails(&self) -> Vec<Descriptor> {
        self.0.last().map(|a| a.tails()).unwrap_or_default()
    }

    fn lock_domains(&self) -> Vec<LockDomain> {
        self.0.lock_domains()
    }
}

/// One predicate per argument.  Built by [`params!`](crate::params).
pub struct Params<T>(T);

impl<T> Params<T> {
    pub fn new(predicates: T) -> Self {
        Params(predicates)
    }
}

macro_rules! impl_params {
    ($(($p:ident, $a:ident, $idx:tt)),*) => {
        impl<$($p, $a),*> Predicate<($($a,)*)> for Params<($($p,)*)>
            where $($p: Predicate<$a>),*
        {
            #[allow(unused_variables)]
            fn eval(&self, args: &($($a,)*)) -> bool {
                true $(&& self.0.$idx.eval(&args.$idx))*
            }

            #[allow(unused_mut, unused_variables)]
            fn find_case<'a>(&'a self, expected: bool, args: &($($a,)*))
                -> Option<Case<'a>>
            {
                let actual = self.eval(args);
                if actual != expected {
                    return None;
                }
                let mut case = Case::new(Some(self), actual);
                $(
                    if let Some(child) = self.0.$idx.find_case(actual,
                                                               &args.$idx)
                    {
                        case = case.add_child(child);
                    }
                )*
                Some(case)
            }
        }

        impl<$($p: fmt::Display),*> fmt::Display for Params<($($p,)*)> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let parts: Vec<String> = vec![$(self.0.$idx.to_string()),*];
                write!(f, "({})", parts.join(", "))
            }
        }

        impl<$($p: fmt::Display),*> PredicateReflection
            for Params<($($p,)*)>
        {}
    }
}

impl_params!();
impl_params!((P0, A0, 0));
impl_params!((P0, A0, 0), (P1, A1, 1));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3),
             (P4, A4, 4));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3),
             (P4, A4, 4), (P5, A5, 5));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3),
             (P4, A4, 4), (P5, A5, 5), (P6, A6, 6));
impl_params!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3),
             (P4, A4, 4), (P5, A5, 5), (P6, A6, 6), (P7, A7, 7));
