// vim: tw=80
//! Usage errors, test failures and their diagnostics
use std::{any::Any, fmt};

use thiserror::Error;

use crate::{CountConstraint, Descriptor};

/// A mistake in the test itself.  These are never converted into ordinary
/// test failures.
#[derive(Clone, Debug, Error)]
pub enum UsageError {
    #[error("mock: {interface} has no method {method}")]
    UnknownMethod {
        interface: &'static str,
        method: String,
    },
    #[error("mock: method {interface}.{method} requires {expected} input \
             parameter(s), got {actual}")]
    ArityMismatch {
        interface: &'static str,
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("mock: method {interface}.{method} has signature {expected}, \
             got {actual}")]
    SignatureMismatch {
        interface: &'static str,
        method: String,
        expected: String,
        actual: String,
    },
    #[error("mock: can't add expected call {0} to a session that has already \
             finished")]
    SessionFinished(Descriptor),
    #[error("mock: expected call {prerequisite} should be registered before \
             {dependent}")]
    UndeclaredPrerequisite {
        prerequisite: Descriptor,
        dependent: Descriptor,
    },
    #[error("mock: expected call {0} has an inverted call count {1}")]
    InvalidCount(Descriptor, CountConstraint),
    #[error("mock: expected call {0} has no return value; use returning or \
             return_const")]
    NoBehavior(Descriptor),
    #[error("mock: expected call {0} returns once, but was called again")]
    BehaviorExpired(Descriptor),
    #[error("mock: expected call {0} was declared with different argument or \
             return types")]
    BehaviorType(Descriptor),
}

/// Why a related expectation did not accept a call
#[derive(Clone, Debug)]
pub enum Mismatch {
    /// The argument pattern rejected the arguments.  Holds an explanation
    /// produced by the pattern, when it has one.
    Arguments(Option<String>),
    /// Some prerequisites have not been called yet.
    Ordering(Vec<Descriptor>),
    /// The expectation was already called the maximum number of times.
    Exhausted,
}

/// A snapshot of an expectation that was declared for the same method as an
/// unexpected call.
#[derive(Clone, Debug)]
pub struct RelatedCall {
    pub descriptor: Descriptor,
    pub pattern: String,
    pub constraint: CountConstraint,
    pub count: usize,
    pub after: Vec<Descriptor>,
    pub mismatch: Mismatch,
}

impl fmt::Display for RelatedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {}", self.descriptor, self.pattern)?;
        if !self.constraint.is_empty() {
            write!(f, ", called {} of {} times", self.count,
                   self.constraint)?;
        }
        for dep in self.after.iter() {
            write!(f, "\n    Expected to be called after {}", dep)?;
        }
        match &self.mismatch {
            Mismatch::Arguments(Some(tree)) => {
                write!(f, "\n    Arguments didn't match:")?;
                for line in tree.lines() {
                    write!(f, "\n      {}", line)?;
                }
                Ok(())
            }
            Mismatch::Arguments(None) =>
                write!(f, "\n    Arguments didn't match"),
            Mismatch::Ordering(pending) => {
                for dep in pending.iter() {
                    write!(f, "\n    Still waiting for {}", dep)?;
                }
                Ok(())
            }
            Mismatch::Exhausted =>
                write!(f, "\n    Already called the maximum number of times"),
        }
    }
}

/// A dispatched call matched none of the live expectations.
#[derive(Clone, Debug)]
pub struct UnexpectedCall {
    pub interface: &'static str,
    pub method: String,
    /// `Debug` rendering of the actual argument tuple
    pub args: String,
    pub related: Vec<RelatedCall>,
}

impl fmt::Display for UnexpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock: unexpected call {}.{}{}", self.interface, self.method,
               self.args)?;
        for call in self.related.iter() {
            write!(f, "\n(*) See {}", call)?;
        }
        Ok(())
    }
}

impl std::error::Error for UnexpectedCall {}

/// An expectation's final call count fell outside its constraint.
#[derive(Clone, Debug, Error)]
#[error("mock: missing call(s) to {descriptor}: expected {constraint} \
         time(s), called {count} time(s)")]
pub struct MissingCall {
    pub descriptor: Descriptor,
    pub constraint: CountConstraint,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    Aborted,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Aborted => f.write_str("aborted"),
            CancelReason::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// The call context was cancelled before the call could be matched.
#[derive(Clone, Debug, Error)]
#[error("mock: call to {interface}.{method} cancelled: {reason}")]
pub struct Cancelled {
    pub interface: &'static str,
    pub method: String,
    pub reason: CancelReason,
}

/// Everything that can go wrong while declaring or dispatching a call.
#[derive(Clone, Debug, Error)]
pub enum MockError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    UnexpectedCall(#[from] UnexpectedCall),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl MockError {
    pub fn is_unexpected_call(&self) -> bool {
        matches!(self, MockError::UnexpectedCall(_))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, MockError::Usage(_))
    }
}

/// A test failure recorded by a [`Controller`](crate::Controller)
#[derive(Clone, Debug, Error)]
pub enum Failure {
    #[error(transparent)]
    UnexpectedCall(#[from] UnexpectedCall),
    #[error(transparent)]
    MissingCall(#[from] MissingCall),
}

impl Failure {
    pub fn is_unexpected_call(&self) -> bool {
        matches!(self, Failure::UnexpectedCall(_))
    }

    pub fn is_missing_call(&self) -> bool {
        matches!(self, Failure::MissingCall(_))
    }
}

/// Does this error report an unexpected call?
pub fn is_unexpected_call(err: &MockError) -> bool {
    err.is_unexpected_call()
}

/// Does this panic payload carry an unexpected call?  Useful with
/// [`std::panic::catch_unwind`] around code that calls mock methods directly.
pub fn is_unexpected_call_payload(payload: &(dyn Any + Send)) -> bool {
    payload.downcast_ref::<MockError>()
        .is_some_and(MockError::is_unexpected_call)
}

/// Abort the exercising code path with `err` as the panic payload.
///
/// The payload is the `MockError` itself, so
/// [`Controller::atomic_check`](crate::Controller::atomic_check) can tell an
/// unexpected call apart from other panics.  The diagnostic is printed first
/// because the default panic hook can't render a non-string payload.
pub fn raise(err: MockError) -> ! {
    if err.is_usage() {
        tracing::error!(error = %err, "mock usage error");
    }
    eprintln!("{}", err);
    std::panic::panic_any(err)
}
