// vim: tw=80
//! Verification sessions
use std::{
    collections::hash_map::HashMap,
    fmt,
    iter,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering}
    },
    thread,
    time::{Duration, Instant}
};

use crate::{
    Assertion,
    Call,
    CallContext,
    CancelToken,
    Descriptor,
    Expectation,
    Failure,
    LockDomain,
    LogReporter,
    MissingCall,
    Mock,
    MockError,
    MockId,
    Reporter,
    context::Binding,
    descriptor::next_id,
    expectation::Record,
    lock::{self, LockSet},
    registry::Args
};

/// Which candidate wins when several expectations accept the same call
///
/// The policy orders the candidates within one session.  A call not bound to
/// any session is offered to each live session in turn, oldest session
/// first, and each session ranks its own candidates by its own policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MatchPolicy {
    /// The expectation declared first.  Lets a test script successive
    /// return values by declaring several expectations in order.
    #[default]
    FirstDeclared,
    /// The expectation declared most recently.  Lets a test override an
    /// earlier, more general expectation.
    LastDeclared,
}

/// The parts of a controller that mocks may keep alive after the controller
/// is gone.
pub(crate) struct Session {
    id: u64,
    done: AtomicBool,
    policy: MatchPolicy,
    reporter: Arc<dyn Reporter>,
    cancel: CancelToken,
}

impl Session {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub(crate) fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub(crate) fn reporter(&self) -> &dyn Reporter {
        &*self.reporter
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Settings for a [`Controller`].  Obtained from [`Controller::builder`].
#[derive(Clone)]
pub struct Config {
    fail_on_drop: bool,
    deadline: Option<Duration>,
    policy: MatchPolicy,
    reporter: Arc<dyn Reporter>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fail_on_drop: true,
            deadline: None,
            policy: MatchPolicy::default(),
            reporter: Arc::new(LogReporter),
        }
    }
}

impl Config {
    /// Should dropping the controller panic if it recorded any failures?
    /// Default: `true`.
    pub fn fail_on_drop(mut self, fail: bool) -> Self {
        self.fail_on_drop = fail;
        self
    }

    /// Cancel calls bound to the session once `timeout` has elapsed from
    /// [`build`](#method.build).
    pub fn deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(timeout);
        self
    }

    pub fn policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn build(self) -> Controller {
        Controller::with_config(self)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("fail_on_drop", &self.fail_on_drop)
            .field("deadline", &self.deadline)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Everything a controller tracks for its session.  Declarations, `finish`
/// and draining all happen under this lock, which is always taken before any
/// mock's ledger lock.
#[derive(Default)]
pub(crate) struct State {
    mocks: HashMap<MockId, Mock>,
    records: HashMap<Descriptor, Arc<Record>>,
    failures: Vec<Failure>,
}

impl State {
    pub(crate) fn lookup(&self, desc: &Descriptor) -> Option<Arc<Record>> {
        self.records.get(desc).cloned()
    }

    pub(crate) fn register(&mut self, mock: &Mock, record: Arc<Record>) {
        self.mocks.entry(mock.id()).or_insert_with(|| mock.clone());
        self.records.insert(record.descriptor().clone(), record);
    }
}

/// One verification session.
///
/// Expectations are declared against a `Controller`, and checked when it
/// [checkpoints](#method.checkpoint) or [finishes](#method.finish).
/// Dropping the controller finishes it, and by default panics if any failure
/// was recorded.
///
/// # Examples
/// ```
/// # use mockledger::*;
/// struct MockLen;
/// impl Interface for MockLen {
///     const NAME: &'static str = "Len";
///     fn register(methods: &mut MethodTableBuilder) {
///         methods.method::<(), usize>("len");
///     }
/// }
///
/// let mock = Mock::new::<MockLen>();
/// let ctrl = Controller::builder().fail_on_drop(false).build();
/// let failures = ctrl.atomic_check(
///     || assert_eq!(3, mock.call::<(), usize>("len", ())),
///     mock.expect::<(), usize>("len").return_const(3usize).times(2)
/// ).unwrap();
/// assert_eq!(1, failures.len());
/// assert!(failures[0].is_missing_call());
/// ```
pub struct Controller {
    session: Arc<Session>,
    domain: LockDomain,
    state: Mutex<State>,
    fail_on_drop: bool,
}

impl Controller {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn builder() -> Config {
        Config::default()
    }

    pub fn with_config(config: Config) -> Self {
        let id = next_id();
        let cancel = match config.deadline {
            Some(timeout) => CancelToken::with_deadline(Instant::now() + timeout),
            None => CancelToken::new()
        };
        let session = Arc::new(Session {
            id,
            done: AtomicBool::new(false),
            policy: config.policy,
            reporter: config.reporter,
            cancel
        });
        tracing::debug!(session = id, "new controller");
        Controller {
            session,
            domain: LockDomain::new(format!("session#{}", id)),
            state: Mutex::default(),
            fail_on_drop: config.fail_on_drop,
        }
    }

    /// The session id
    pub fn id(&self) -> u64 {
        self.session.id()
    }

    pub fn is_done(&self) -> bool {
        self.session.is_done()
    }

    /// The session's cancellation signal.  Cancelling it aborts every later
    /// call bound to this session.
    pub fn cancel_token(&self) -> CancelToken {
        self.session.cancel_token().clone()
    }

    /// The lock domain held by this session's atomic checks
    pub fn lock_domain(&self) -> &LockDomain {
        &self.domain
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// A call context bound to this session
    pub fn context(&self) -> CallContext {
        CallContext {
            session: Some(self.session.clone()),
            cancel: None
        }
    }

    /// Bind this session to the current thread until the guard is dropped.
    /// Mock calls made by the thread in the meantime only match this
    /// session's expectations.
    pub fn enter(&self) -> Binding {
        Binding::push(self.context())
    }

    // Poisoning can only happen while a reporter panics; the state is still
    // consistent.
    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a single call and return a handle to its record.
    pub fn declare<A: Args, R: 'static>(&self, call: &Call<A, R>)
        -> Result<Expectation, MockError>
    {
        call.declare(self)
    }

    /// Declare every expectation in `assertion`.
    pub fn try_expect<T: Assertion>(&self, assertion: T)
        -> Result<(), MockError>
    {
        assertion.setup(self)
    }

    /// Declare every expectation in `assertion`, aborting through the
    /// session's [`Reporter`] on a usage error.
    pub fn expect<T: Assertion>(&self, assertion: T) {
        if let Err(e) = assertion.setup(self) {
            self.session.reporter().abort(e)
        }
    }

    /// Detach every touched mock and take this session's ledger from each,
    /// oldest mock first.  The state lock is held throughout, so no
    /// declaration can slip in between.
    fn drain_ledgers(&self) -> Vec<(Mock, Vec<Arc<Record>>)> {
        let mut state = self.state();
        state.records.clear();
        let mut mocks = state.mocks.drain()
            .map(|(_, mock)| mock)
            .collect::<Vec<_>>();
        mocks.sort_by_key(Mock::id);
        mocks.into_iter()
            .map(|mock| {
                let records = mock.take_ledger(self.id());
                (mock, records)
            }).collect()
    }

    /// Verify and discard every expectation declared so far.
    ///
    /// Returns one [`MissingCall`] failure for every expectation whose call
    /// count lies outside its constraint.  The failures are also reported and
    /// recorded.  The session stays open.
    pub fn checkpoint(&self) -> Vec<Failure> {
        let mut failures = Vec::new();
        for (_, records) in self.drain_ledgers() {
            for record in records {
                let constraint = record.constraint();
                let count = record.count();
                if !constraint.contains(count) {
                    failures.push(Failure::MissingCall(MissingCall {
                        descriptor: record.descriptor().clone(),
                        constraint,
                        count
                    }));
                }
            }
        }
        for failure in failures.iter() {
            self.session.reporter().report(failure);
        }
        self.state().failures.extend(failures.iter().cloned());
        failures
    }

    /// Drop every expectation declared so far without verifying it.
    fn discard(&self) {
        for (mock, records) in self.drain_ledgers() {
            tracing::trace!(session = self.id(), mock = %mock.id(),
                            discarded = records.len(), "discarded ledger");
        }
    }

    /// Close the session and checkpoint it.  Later declarations are usage
    /// errors.  Calling `finish` again does nothing.
    pub fn finish(&self) -> Vec<Failure> {
        {
            // Declarations check the flag under the same lock
            let _state = self.state();
            if self.session.done.swap(true, Ordering::AcqRel) {
                return Vec::new();
            }
        }
        tracing::debug!(session = self.id(), "finishing");
        self.checkpoint()
    }

    /// Run `exercise` against `assertions` as one indivisible step.
    ///
    /// Holds this session's lock domain, plus every domain the assertions
    /// name, for the whole step.  Domains are always acquired in the same
    /// order, so concurrent atomic checks can't deadlock.  The assertions are
    /// declared, the session is bound to the current thread while `exercise`
    /// runs, and then the session checkpoints.
    ///
    /// Returns every failure found: an unexpected call that aborted
    /// `exercise`, followed by the missing calls.  A usage error while
    /// declaring or exercising is returned as `Err`, and any other panic from
    /// `exercise` is resumed.  Either way, the session's expectations are
    /// discarded first.
    ///
    /// Not reentrant: calling `atomic_check` on the same controller from
    /// within `exercise` deadlocks.
    pub fn atomic_check<F, T>(&self, exercise: F, assertions: T)
        -> Result<Vec<Failure>, MockError>
        where F: FnOnce(),
              T: Assertion
    {
        let domains = lock::canonicalize(
            iter::once(self.domain.clone()).chain(assertions.lock_domains())
        );
        let locks = LockSet::acquire(&domains);
        tracing::debug!(session = self.id(), domains = locks.len(),
                        "atomic check");

        if let Err(e) = assertions.setup(self) {
            self.discard();
            return Err(e);
        }

        let outcome = {
            let _binding = self.enter();
            panic::catch_unwind(AssertUnwindSafe(exercise))
        };

        let mut failures = Vec::new();
        if let Err(payload) = outcome {
            match payload.downcast::<MockError>() {
                Ok(err) => match *err {
                    MockError::UnexpectedCall(uc) => {
                        let failure = Failure::UnexpectedCall(uc);
                        self.session.reporter().report(&failure);
                        self.state().failures.push(failure.clone());
                        failures.push(failure);
                    }
                    err => {
                        self.discard();
                        return Err(err);
                    }
                },
                Err(payload) => {
                    self.discard();
                    drop(locks);
                    panic::resume_unwind(payload);
                }
            }
        }
        failures.extend(self.checkpoint());
        Ok(failures)
    }

    /// Every failure recorded so far
    pub fn failures(&self) -> Vec<Failure> {
        self.state().failures.clone()
    }

    /// Remove and return every failure recorded so far.
    pub fn take_failures(&self) -> Vec<Failure> {
        std::mem::take(&mut self.state().failures)
    }

    /// Record a failure found outside of the controller, and report it.
    pub fn report(&self, failure: Failure) {
        self.session.reporter().report(&failure);
        self.state().failures.push(failure);
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("session", &self.session.id)
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.finish();
        if self.fail_on_drop && !thread::panicking() {
            let failures = self.take_failures();
            if !failures.is_empty() {
                let msgs = failures.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                panic!("{}", msgs.join("\n"));
            }
        }
    }
}
