// vim: tw=80
//! The ambient verification context of the current thread
//!
//! Generated mock methods can't take extra parameters, so the session a call
//! belongs to is found through a per-thread stack of bindings.  A binding is
//! pushed by [`Controller::enter`](crate::Controller::enter) and by
//! [`Controller::atomic_check`](crate::Controller::atomic_check).  A thread
//! with no binding dispatches against every live session.
use std::{
    cell::RefCell,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering}
    },
    time::Instant
};

use crate::{CancelReason, controller::Session};

/// A cancellation signal: an external abort flag and an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken { aborted: Arc::default(), deadline: Some(deadline) }
    }

    /// Abort every call that observes this token from now on.
    pub fn cancel(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Has the token been triggered, and why?
    pub fn reason(&self) -> Option<CancelReason> {
        if self.aborted.load(Ordering::Acquire) {
            Some(CancelReason::Aborted)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }
}

/// Where a call is dispatched: optionally bound to one session, optionally
/// cancellable.
#[derive(Clone, Default)]
pub struct CallContext {
    pub(crate) session: Option<Arc<Session>>,
    pub(crate) cancel: Option<CancelToken>,
}

impl CallContext {
    /// A context that matches against every live session and can't be
    /// cancelled.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn cancelled(&self) -> Option<CancelReason> {
        self.cancel.as_ref().and_then(CancelToken::reason)
    }
}

thread_local! {
    static BINDINGS: RefCell<Vec<CallContext>> = const {
        RefCell::new(Vec::new())
    };
}

/// The innermost context bound to this thread, or an unbound one.
pub fn current() -> CallContext {
    BINDINGS.with(|b| b.borrow().last().cloned().unwrap_or_default())
}

/// Keeps a context bound to the current thread until dropped.
#[must_use = "the binding is released as soon as the guard is dropped"]
pub struct Binding {
    depth: usize,
    // Bindings are per-thread, so the guard must not move to another thread
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Binding {
    pub(crate) fn push(ctx: CallContext) -> Self {
        let depth = BINDINGS.with(|b| {
            let mut b = b.borrow_mut();
            b.push(ctx);
            b.len()
        });
        Binding { depth, _not_send: std::marker::PhantomData }
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let len = BINDINGS.with(|b| {
            let mut b = b.borrow_mut();
            let len = b.len();
            b.truncate(self.depth - 1);
            len
        });
        if !std::thread::panicking() {
            debug_assert_eq!(len, self.depth, "bindings released out of order");
        }
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel() {
        let token = CancelToken::new();
        assert_eq!(None, token.reason());
        let clone = token.clone();
        clone.cancel();
        assert_eq!(Some(CancelReason::Aborted), token.reason());
    }

    #[test]
    fn deadline() {
        let past = Instant::now() - Duration::from_millis(1);
        let token = CancelToken::with_deadline(past);
        assert_eq!(Some(CancelReason::DeadlineExceeded), token.reason());

        let future = Instant::now() + Duration::from_secs(3600);
        assert!(!CancelToken::with_deadline(future).is_cancelled());
    }

    #[test]
    fn bindings_nest() {
        assert!(!current().is_bound());
        let token = CancelToken::new();
        {
            let _outer = Binding::push(
                CallContext::unbound().with_cancel(token.clone()));
            assert!(current().cancel.is_some());
            {
                let _inner = Binding::push(CallContext::unbound());
                assert!(current().cancel.is_none());
            }
            assert!(current().cancel.is_some());
        }
        assert!(current().cancel.is_none());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "bindings released out of order")]
    fn bindings_released_out_of_order() {
        let outer = Binding::push(CallContext::unbound());
        let _inner = Binding::push(CallContext::unbound());
        drop(outer);
    }

    #[test]
    fn bindings_are_per_thread() {
        let _b = Binding::push(
            CallContext::unbound().with_cancel(CancelToken::new()));
        let other = std::thread::spawn(|| current().cancel.is_none())
            .join()
            .unwrap();
        assert!(other);
    }
}
