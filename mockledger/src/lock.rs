// vim: tw=80
//! Exclusive lock domains and deadlock-free acquisition of several of them
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError}
};

use crate::descriptor::next_id;

struct Inner {
    id: u64,
    name: String,
    mutex: Mutex<()>,
}

/// A named exclusive resource.
///
/// An expectation can name lock domains with
/// [`Call::locking`](crate::Call::locking).  While
/// [`Controller::atomic_check`](crate::Controller::atomic_check) runs, it
/// holds every domain named by its expectations, so two atomic checks that
/// touch the same resource never overlap.  Clones refer to the same domain.
#[derive(Clone)]
pub struct LockDomain(Arc<Inner>);

impl LockDomain {
    pub fn new(name: impl Into<String>) -> Self {
        LockDomain(Arc::new(Inner {
            id: next_id(),
            name: name.into(),
            mutex: Mutex::new(()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Position of this domain in the global acquisition order
    pub fn id(&self) -> u64 {
        self.0.id
    }

    // A panicking test poisons the mutex, but the mutex guards no data, so
    // the next test may proceed.
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for LockDomain {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for LockDomain {}

impl fmt::Debug for LockDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockDomain({}#{})", self.0.name, self.0.id)
    }
}

/// Sort by acquisition order and drop duplicates.
pub(crate) fn canonicalize<I>(domains: I) -> Vec<LockDomain>
    where I: IntoIterator<Item = LockDomain>
{
    let mut v: Vec<LockDomain> = domains.into_iter().collect();
    v.sort_by_key(LockDomain::id);
    v.dedup();
    v
}

/// Guards for a canonicalized set of domains.  Locks are taken in ascending
/// id order and released in the reverse order.
pub(crate) struct LockSet<'a> {
    guards: Vec<MutexGuard<'a, ()>>,
}

impl<'a> LockSet<'a> {
    /// `domains` must come from [`canonicalize`].
    pub(crate) fn acquire(domains: &'a [LockDomain]) -> Self {
        debug_assert!(domains.windows(2).all(|w| w[0].id() < w[1].id()));
        let guards = domains.iter().map(LockDomain::lock).collect();
        LockSet { guards }
    }

    pub(crate) fn len(&self) -> usize {
        self.guards.len()
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}
