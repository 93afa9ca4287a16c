// vim: tw=80
//! Mock objects and call dispatch
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError}
};

use crate::{
    Call,
    CallContext,
    Controller,
    Descriptor,
    Expectation,
    Interface,
    MethodTable,
    Mismatch,
    MockError,
    MockId,
    RelatedCall,
    TypeRegistry,
    UnexpectedCall,
    UsageError,
    Cancelled,
    context,
    controller::Session,
    descriptor::next_id,
    error,
    expectation::Record,
    registry::{self, Args}
};

/// The expectations one session declared on one mock
struct Ledger {
    session: Arc<Session>,
    records: HashMap<Descriptor, Arc<Record>>,
}

struct Inner {
    id: MockId,
    table: Arc<MethodTable>,
    /// Keyed by session id
    ledgers: Mutex<HashMap<u64, Ledger>>,
}

/// A mock object for one interface.
///
/// A `Mock` holds a separate ledger of expectations for every session that
/// declared some on it, so one mock may be shared by tests running in
/// parallel.  Clones refer to the same mock.
///
/// Mocks are normally wrapped by the struct that
/// [`#[automock]`](crate::automock) generates, but they can be driven
/// directly through [`Mock::expect`] and [`Mock::dispatch`].
///
/// # Examples
/// ```
/// # use mockledger::*;
/// struct MockSorter;
/// impl Interface for MockSorter {
///     const NAME: &'static str = "Sorter";
///     fn register(methods: &mut MethodTableBuilder) {
///         methods.method::<(), usize>("len");
///     }
/// }
///
/// let ctrl = Controller::new();
/// let mock = Mock::new::<MockSorter>();
/// ctrl.expect(mock.expect::<(), usize>("len").return_const(3usize));
/// let ctx = ctrl.context();
/// assert_eq!(3, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
/// assert!(mock.dispatch::<(), usize>(&ctx, "len", ())
///     .unwrap_err()
///     .is_unexpected_call());
/// ctrl.finish();
/// ```
#[derive(Clone)]
pub struct Mock(Arc<Inner>);

impl Mock {
    /// Create a mock of `T`, using the process-wide [`TypeRegistry`].
    pub fn new<T: Interface>() -> Self {
        Self::with_registry::<T>(registry::global())
    }

    pub fn with_registry<T: Interface>(registry: &TypeRegistry) -> Self {
        Self::from_table(registry.lookup::<T>())
    }

    pub fn from_table(table: Arc<MethodTable>) -> Self {
        Mock(Arc::new(Inner {
            id: MockId::new(),
            table,
            ledgers: Mutex::default()
        }))
    }

    pub fn id(&self) -> MockId {
        self.0.id
    }

    pub fn interface(&self) -> &'static str {
        self.0.table.interface()
    }

    pub fn table(&self) -> &MethodTable {
        &self.0.table
    }

    /// Start building an expectation for `method`.  The call site becomes
    /// part of the expectation's [`Descriptor`].
    #[track_caller]
    pub fn expect<A: Args, R: 'static>(&self, method: &'static str)
        -> Call<A, R>
    {
        Call::new(self, method)
    }

    // A panicking behavior may poison the mutex, but the ledgers are always
    // consistent between statements.
    fn ledgers(&self) -> MutexGuard<'_, HashMap<u64, Ledger>> {
        self.0.ledgers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `call` to `controller`'s ledger for this mock.
    ///
    /// Declaring the same `Call` (or a clone of it) twice in one session
    /// returns the record created the first time.
    pub fn declare_expectation<A: Args, R: 'static>(&self,
                                                    controller: &Controller,
                                                    call: &Call<A, R>)
        -> Result<Expectation, MockError>
    {
        let desc = call.descriptor();
        self.0.table.check::<A, R>(desc.method())?;
        let constraint = call.count_constraint();
        if constraint.is_inverted() {
            return Err(UsageError::InvalidCount(desc.clone(), constraint)
                       .into());
        }
        let session = controller.session();
        // Held until the record is registered, so that `finish` and
        // `checkpoint` see either all of this declaration or none of it.
        let mut state = controller.state();
        if session.is_done() {
            return Err(UsageError::SessionFinished(desc.clone()).into());
        }
        if let Some(existing) = self.ledgers()
            .get(&session.id())
            .and_then(|l| l.records.get(desc))
        {
            return Ok(Expectation(existing.clone()));
        }

        let after = call.prerequisites().into_iter()
            .map(|prereq| state.lookup(&prereq).ok_or_else(|| {
                UsageError::UndeclaredPrerequisite {
                    prerequisite: prereq,
                    dependent: desc.clone()
                }
            })).collect::<Result<Vec<_>, _>>()?;

        let record = Arc::new(Record::new(desc.clone(), call.rule(),
            constraint, after, next_id(), session.policy()));
        self.ledgers()
            .entry(session.id())
            .or_insert_with(|| Ledger {
                session: session.clone(),
                records: HashMap::new()
            })
            .records
            .insert(desc.clone(), record.clone());
        state.register(self, record.clone());
        drop(state);
        tracing::debug!(expectation = %desc, constraint = %constraint,
                        session = session.id(), "declared expectation");
        Ok(Expectation(record))
    }

    /// Match a call against the live expectations and run the chosen one's
    /// behavior.
    ///
    /// `context` selects the sessions that may match.  An unbound context
    /// matches against every live session.
    pub fn dispatch<A: Args, R: 'static>(&self,
                                         context: &CallContext,
                                         method: &str,
                                         args: A)
        -> Result<R, MockError>
    {
        let reason = context.cancelled().or_else(|| {
            context.session.as_ref().and_then(|s| s.cancel_token().reason())
        });
        if let Some(reason) = reason {
            return Err(Cancelled {
                interface: self.interface(),
                method: method.to_owned(),
                reason
            }.into());
        }
        self.0.table.check::<A, R>(method)?;

        let record = self.select::<A, R>(context, method, &args)?;
        tracing::debug!(expectation = %record.descriptor(),
                        count = record.count(), "matched call");
        let r = record.rule::<A, R>()?.call(args, record.descriptor())?;
        Ok(r)
    }

    /// Find the first candidate that accepts the call and count the call
    /// against it.
    fn select<A: Args, R: 'static>(&self,
                                   context: &CallContext,
                                   method: &str,
                                   args: &A)
        -> Result<Arc<Record>, MockError>
    {
        let ledgers = self.ledgers();
        let mut related = ledgers.values()
            .filter(|l| !l.session.is_done())
            .filter(|l| context.session.as_ref()
                    .map_or(true, |s| s.id() == l.session.id()))
            .flat_map(|l| {
                l.records.values().map(move |r| (l.session.id(), r))
            }).filter(|(_, r)| r.descriptor().method() == method)
            .collect::<Vec<_>>();
        // Each session's policy orders only its own records
        related.sort_by_key(|(session, r)| (*session, r.rank()));

        for (_, record) in related.iter() {
            let rule = record.rule::<A, R>()?;
            // register_call fails only if another thread exhausted the record
            // since it was inspected; fall through to the next candidate.
            if rule.matches(args) && record.pending().is_empty() &&
                record.register_call()
            {
                return Ok((*record).clone());
            }
        }

        let related = related.iter()
            .map(|(_, record)| {
                let rule = record.rule::<A, R>()?;
                let pending = record.pending();
                let mismatch = if !rule.matches(args) {
                    Mismatch::Arguments(rule.explain(args))
                } else if !pending.is_empty() {
                    Mismatch::Ordering(pending)
                } else {
                    Mismatch::Exhausted
                };
                Ok(RelatedCall {
                    descriptor: record.descriptor().clone(),
                    pattern: record.pattern(),
                    constraint: record.constraint(),
                    count: record.count(),
                    after: record.after().cloned().collect(),
                    mismatch
                })
            }).collect::<Result<Vec<_>, UsageError>>()?;
        Err(UnexpectedCall {
            interface: self.interface(),
            method: method.to_owned(),
            args: format!("{:?}", args),
            related
        }.into())
    }

    /// Dispatch against the current thread's context, aborting the calling
    /// code path on any error.  This is what generated trait methods use.
    ///
    /// The abort goes through the bound session's
    /// [`Reporter`](crate::Reporter), or [`raise`](crate::raise) when the
    /// thread isn't bound.
    pub fn call<A: Args, R: 'static>(&self, method: &'static str, args: A)
        -> R
    {
        let ctx = context::current();
        match self.dispatch(&ctx, method, args) {
            Ok(r) => r,
            Err(e) => match ctx.session {
                Some(session) => session.reporter().abort(e),
                None => error::raise(e)
            }
        }
    }

    /// Remove a session's ledger, oldest record first.
    pub(crate) fn take_ledger(&self, session: u64) -> Vec<Arc<Record>> {
        let mut records = self.ledgers()
            .remove(&session)
            .map(|l| l.records.into_values().collect::<Vec<_>>())
            .unwrap_or_default();
        records.sort_by_key(|r| r.seq());
        tracing::trace!(mock = %self.0.id, session, records = records.len(),
                        "took ledger");
        records
    }

    /// Number of live expectations across all sessions
    pub fn live_expectations(&self) -> usize {
        self.ledgers().values().map(|l| l.records.len()).sum()
    }
}

impl AsRef<Mock> for Mock {
    fn as_ref(&self) -> &Mock {
        self
    }
}

impl fmt::Debug for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mock")
            .field("id", &self.0.id)
            .field("interface", &self.interface())
            .finish()
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::{MethodTableBuilder, params, predicate::*};

    struct MockSorter;
    impl Interface for MockSorter {
        const NAME: &'static str = "Sorter";
        fn register(methods: &mut MethodTableBuilder) {
            methods.method::<(), usize>("len")
                .method::<(usize, usize), bool>("less")
                .method::<(usize, usize), ()>("swap");
        }
    }

    fn quiet() -> Controller {
        Controller::builder().fail_on_drop(false).build()
    }

    #[test]
    fn first_declared_wins() {
        let ctrl = quiet();
        let mock = Mock::new::<MockSorter>();
        ctrl.expect(mock.expect::<(), usize>("len").return_const(1usize));
        ctrl.expect(mock.expect::<(), usize>("len").return_const(2usize));
        let ctx = ctrl.context();
        assert_eq!(1, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
        assert_eq!(2, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
        assert!(ctrl.finish().is_empty());
    }

    #[test]
    fn last_declared_wins() {
        let ctrl = Controller::builder()
            .fail_on_drop(false)
            .policy(crate::MatchPolicy::LastDeclared)
            .build();
        let mock = Mock::new::<MockSorter>();
        ctrl.expect(mock.expect::<(), usize>("len").return_const(1usize));
        ctrl.expect(mock.expect::<(), usize>("len").return_const(2usize));
        let ctx = ctrl.context();
        assert_eq!(2, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
    }

    /// An unbound call tries the older session first, in that session's own
    /// order, before moving on to the newer one.
    #[test]
    fn unbound_ranks_within_each_session() {
        let older = Controller::builder()
            .fail_on_drop(false)
            .policy(crate::MatchPolicy::LastDeclared)
            .build();
        let newer = quiet();
        let mock = Mock::new::<MockSorter>();
        older.expect(mock.expect::<(), usize>("len").return_const(1usize));
        older.expect(mock.expect::<(), usize>("len").return_const(2usize));
        newer.expect(mock.expect::<(), usize>("len").return_const(9usize));
        let ctx = CallContext::unbound();
        assert_eq!(2, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
        assert_eq!(1, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
        assert_eq!(9, mock.dispatch::<(), usize>(&ctx, "len", ()).unwrap());
        assert!(older.finish().is_empty());
        assert!(newer.finish().is_empty());
    }

    #[test]
    fn related_calls_explain_mismatch() {
        let ctrl = quiet();
        let mock = Mock::new::<MockSorter>();
        ctrl.expect(mock.expect::<(usize, usize), bool>("less")
                    .with(params!(eq(1), eq(0)))
                    .return_const(true));
        ctrl.expect(mock.expect::<(), usize>("len").return_const(3usize));
        let e = mock.dispatch::<(usize, usize), bool>(&ctrl.context(), "less",
                                                      (2, 1))
            .unwrap_err();
        let uc = match e {
            MockError::UnexpectedCall(uc) => uc,
            e => panic!("Wrong error {:?}", e)
        };
        assert_eq!("(2, 1)", uc.args);
        assert_eq!(1, uc.related.len());
        assert!(matches!(uc.related[0].mismatch, Mismatch::Arguments(Some(_))));
        let s = uc.to_string();
        assert!(s.starts_with("mock: unexpected call Sorter.less(2, 1)\n(*) See \
                              Sorter.less defined at "), "{}", s);
    }

    #[test]
    fn unknown_method() {
        let ctrl = quiet();
        let mock = Mock::new::<MockSorter>();
        let e = mock.dispatch::<(), ()>(&ctrl.context(), "reverse", ())
            .unwrap_err();
        assert!(e.is_usage());
        let e = ctrl.declare(&mock.expect::<(), ()>("reverse")).unwrap_err();
        assert!(e.is_usage());
    }

    #[test]
    fn take_ledger_removes_records() {
        let ctrl = quiet();
        let mock = Mock::new::<MockSorter>();
        ctrl.expect(mock.expect::<(usize, usize), ()>("swap"));
        ctrl.expect(mock.expect::<(usize, usize), ()>("swap").times(2));
        assert_eq!(2, mock.live_expectations());
        let records = mock.take_ledger(ctrl.id());
        assert_eq!(2, records.len());
        assert!(records[0].seq() < records[1].seq());
        assert_eq!(0, mock.live_expectations());
    }
}
