// vim: tw=80
//! Where failures go
use crate::{Failure, MockError, raise};

/// The test harness as seen by a [`Controller`](crate::Controller).
///
/// `report` must not abort the test: it is called for every failure a
/// checkpoint finds.  `abort` stops the exercising code path.  An
/// implementation that overrides `abort` should still panic with the
/// `MockError` as payload, or
/// [`Controller::atomic_check`](crate::Controller::atomic_check) won't
/// recognize unexpected calls.
pub trait Reporter: Send + Sync {
    /// Report a failure without aborting.
    fn report(&self, failure: &Failure);

    /// Report an error and abort.
    fn abort(&self, err: MockError) -> ! {
        raise(err)
    }
}

/// The default [`Reporter`].  Emits each failure as a `tracing` warning; the
/// controller keeps the failure itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, failure: &Failure) {
        tracing::warn!(%failure, "mock failure");
    }
}
