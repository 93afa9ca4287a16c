// vim: tw=80
//! Identities of mocks and of declared expectations
use std::{
    cmp::Ordering as CmpOrdering,
    fmt,
    hash::{Hash, Hasher},
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering}
    }
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique identifier.  Shared by mocks, sessions,
/// descriptors, lock domains and registration sequence numbers, so all of
/// them are totally ordered by creation time.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of one mock object.  Clones of a [`Mock`](crate::Mock) share it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MockId(u64);

impl MockId {
    pub(crate) fn new() -> Self {
        MockId(next_id())
    }
}

impl fmt::Display for MockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Inner {
    id: u64,
    mock: MockId,
    interface: &'static str,
    method: &'static str,
    location: &'static Location<'static>,
}

/// The identity of one declared expectation.
///
/// Two descriptors are equal only if one is a clone of the other.  Building a
/// second, otherwise identical [`Call`](crate::Call) creates a distinct
/// expectation.
#[derive(Clone)]
pub struct Descriptor(Arc<Inner>);

impl Descriptor {
    pub(crate) fn new(mock: MockId,
                      interface: &'static str,
                      method: &'static str,
                      location: &'static Location<'static>) -> Self
    {
        Descriptor(Arc::new(Inner {
            id: next_id(),
            mock,
            interface,
            method,
            location
        }))
    }

    pub fn mock(&self) -> MockId {
        self.0.mock
    }

    pub fn interface(&self) -> &'static str {
        self.0.interface
    }

    pub fn method(&self) -> &'static str {
        self.0.method
    }

    /// Where the expectation was created
    pub fn location(&self) -> &'static Location<'static> {
        self.0.location
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl PartialOrd for Descriptor {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Descriptor {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.id.cmp(&other.0.id)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} defined at {}", self.0.interface, self.0.method,
               self.0.location)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.0.id)
            .field("mock", &self.0.mock)
            .field("method", &format_args!("{}.{}", self.0.interface,
                                           self.0.method))
            .field("location", &format_args!("{}", self.0.location))
            .finish()
    }
}
