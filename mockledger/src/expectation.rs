// vim: tw=80
//! Run-time state of declared expectations
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering}
    }
};

use downcast::*;

use crate::{
    CountConstraint,
    Descriptor,
    MatchPolicy,
    UsageError,
    call::Rule,
    registry::Args
};

/// The behavior and argument pattern of an expectation, with its argument and
/// return types erased.
#[doc(hidden)]
pub trait AnyRule: Any + Send + Sync {
    /// Human-readable description of the argument pattern
    fn pattern(&self) -> String;
}
downcast!(dyn AnyRule);

/// One expectation within one session.
pub(crate) struct Record {
    desc: Descriptor,
    rule: Arc<dyn AnyRule>,
    constraint: CountConstraint,
    after: Vec<Arc<Record>>,
    count: AtomicUsize,
    /// Registration sequence number
    seq: u64,
    policy: MatchPolicy,
}

impl Record {
    pub(crate) fn new(desc: Descriptor,
                      rule: Arc<dyn AnyRule>,
                      constraint: CountConstraint,
                      after: Vec<Arc<Record>>,
                      seq: u64,
                      policy: MatchPolicy) -> Self
    {
        Record {
            desc,
            rule,
            constraint,
            after,
            count: AtomicUsize::new(0),
            seq,
            policy
        }
    }

    pub(crate) fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub(crate) fn constraint(&self) -> CountConstraint {
        self.constraint
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn after(&self) -> impl Iterator<Item=&Descriptor> {
        self.after.iter().map(|r| r.descriptor())
    }

    /// Sort key among candidates.  Lower ranks are tried first.
    pub(crate) fn rank(&self) -> u64 {
        match self.policy {
            MatchPolicy::FirstDeclared => self.seq,
            MatchPolicy::LastDeclared => u64::MAX - self.seq,
        }
    }

    pub(crate) fn pattern(&self) -> String {
        self.rule.pattern()
    }

    /// Prerequisites that have not been called even once
    pub(crate) fn pending(&self) -> Vec<Descriptor> {
        self.after.iter()
            .filter(|r| r.count() == 0)
            .map(|r| r.descriptor().clone())
            .collect()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        !self.constraint.admits_another(self.count())
    }

    pub(crate) fn rule<A: Args, R: 'static>(&self)
        -> Result<&Rule<A, R>, UsageError>
    {
        self.rule.downcast_ref::<Rule<A, R>>()
            .map_err(|_| UsageError::BehaviorType(self.desc.clone()))
    }

    /// Count one more call, unless that would exceed the maximum.
    pub(crate) fn register_call(&self) -> bool {
        let mut count = self.count.load(Ordering::Acquire);
        loop {
            if !self.constraint.admits_another(count) {
                return false;
            }
            match self.count.compare_exchange_weak(count, count + 1,
                Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => count = actual
            }
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.desc)?;
        if !self.constraint.is_empty() {
            write!(f, ", called {} of {} times", self.count(),
                   self.constraint)?;
        }
        for dep in self.after() {
            write!(f, "\n    Expected to be called after {}", dep)?;
        }
        Ok(())
    }
}

/// A handle to a declared expectation, returned by
/// [`Controller::declare`](crate::Controller::declare).
///
/// The handle stays valid after the session checkpoints, but its count no
/// longer changes.
#[derive(Clone)]
pub struct Expectation(pub(crate) Arc<Record>);

impl Expectation {
    pub fn descriptor(&self) -> &Descriptor {
        self.0.descriptor()
    }

    /// How many calls have matched so far
    pub fn count(&self) -> usize {
        self.0.count()
    }

    pub fn constraint(&self) -> CountConstraint {
        self.0.constraint()
    }

    /// Has it been called at least the minimum number of times?
    pub fn is_satisfied(&self) -> bool {
        self.0.constraint().min().map_or(true, |min| self.count() >= min)
    }

    /// Has it been called the maximum number of times?
    pub fn is_exhausted(&self) -> bool {
        self.0.is_exhausted()
    }

    /// Is this the very same record as `other`?
    pub fn ptr_eq(&self, other: &Expectation) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("descriptor", self.descriptor())
            .field("constraint", &self.constraint())
            .field("count", &self.count())
            .finish()
    }
}
