// vim: tw=80
//! Typed method tables for mocked interfaces
//!
//! Every mocked interface owns one [`MethodTable`], built once from its
//! [`Interface`] implementation and then shared by all of its mock objects.
//! The table is what lets [`Mock::dispatch`](crate::Mock::dispatch) reject a
//! call to a method the interface doesn't have, or a call with the wrong
//! argument types, before looking at any expectation.
use std::{
    any::{self, TypeId},
    collections::hash_map::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock}
};

use lazy_static::lazy_static;

use crate::UsageError;

/// An argument tuple that can be passed to a mocked method.
///
/// Implemented for tuples of up to twelve owned, `Debug` values.
pub trait Args: fmt::Debug + Send + 'static {
    const ARITY: usize;
}

macro_rules! impl_args {
    ($arity:expr; $($t:ident),*) => {
        impl<$($t: fmt::Debug + Send + 'static),*> Args for ($($t,)*) {
            const ARITY: usize = $arity;
        }
    }
}

impl_args!(0;);
impl_args!(1; A0);
impl_args!(2; A0, A1);
impl_args!(3; A0, A1, A2);
impl_args!(4; A0, A1, A2, A3);
impl_args!(5; A0, A1, A2, A3, A4);
impl_args!(6; A0, A1, A2, A3, A4, A5);
impl_args!(7; A0, A1, A2, A3, A4, A5, A6);
impl_args!(8; A0, A1, A2, A3, A4, A5, A6, A7);
impl_args!(9; A0, A1, A2, A3, A4, A5, A6, A7, A8);
impl_args!(10; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_args!(11; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
impl_args!(12; A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11);

/// Signature of one mocked method
#[derive(Clone, Copy, Debug)]
pub struct MethodSignature {
    name: &'static str,
    arity: usize,
    args: TypeId,
    args_name: &'static str,
    output: TypeId,
    output_name: &'static str,
}

impl MethodSignature {
    pub fn of<A: Args, R: 'static>(name: &'static str) -> Self {
        MethodSignature {
            name,
            arity: A::ARITY,
            args: TypeId::of::<A>(),
            args_name: any::type_name::<A>(),
            output: TypeId::of::<R>(),
            output_name: any::type_name::<R>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    fn accepts<A: Args, R: 'static>(&self) -> bool {
        self.args == TypeId::of::<A>() && self.output == TypeId::of::<R>()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{} -> {}", self.args_name, self.output_name)
    }
}

/// All methods of one mocked interface, keyed by name
#[derive(Debug)]
pub struct MethodTable {
    interface: &'static str,
    methods: HashMap<&'static str, MethodSignature>,
}

impl MethodTable {
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    pub fn get(&self, method: &str) -> Option<&MethodSignature> {
        self.methods.get(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Look up `method` and verify that it takes `A` and returns `R`.
    pub fn check<A: Args, R: 'static>(&self, method: &str)
        -> Result<&MethodSignature, UsageError>
    {
        let sig = self.get(method).ok_or_else(|| UsageError::UnknownMethod {
            interface: self.interface,
            method: method.to_owned(),
        })?;
        if sig.arity != A::ARITY {
            return Err(UsageError::ArityMismatch {
                interface: self.interface,
                method: method.to_owned(),
                expected: sig.arity,
                actual: A::ARITY,
            });
        }
        if !sig.accepts::<A, R>() {
            return Err(UsageError::SignatureMismatch {
                interface: self.interface,
                method: method.to_owned(),
                expected: sig.to_string(),
                actual: MethodSignature::of::<A, R>(sig.name).to_string(),
            });
        }
        Ok(sig)
    }
}

/// Collects method signatures while an [`Interface`] registers itself.
pub struct MethodTableBuilder {
    table: MethodTable,
}

impl MethodTableBuilder {
    fn new(interface: &'static str) -> Self {
        MethodTableBuilder {
            table: MethodTable { interface, methods: HashMap::new() }
        }
    }

    /// Declare a method taking the argument tuple `A` and returning `R`.
    pub fn method<A: Args, R: 'static>(&mut self, name: &'static str)
        -> &mut Self
    {
        self.table.methods.insert(name, MethodSignature::of::<A, R>(name));
        self
    }

    fn build(self) -> MethodTable {
        self.table
    }
}

/// A mockable interface.  Usually implemented by
/// [`#[automock]`](crate::automock) on the generated mock struct.
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
/// let table = TypeRegistry::new().lookup::<MockLen>();
/// assert_eq!(1, table.len());
/// ```
pub trait Interface: 'static {
    /// Name used in diagnostics
    const NAME: &'static str;

    fn register(methods: &mut MethodTableBuilder);
}

/// A thread-safe cache of method tables, keyed by interface type.  Each
/// table is built the first time its interface is looked up and never
/// changes afterwards.
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<TypeId, Arc<MethodTable>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup<T: Interface>(&self) -> Arc<MethodTable> {
        let key = TypeId::of::<T>();
        if let Some(table) = self.entries.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return table.clone();
        }
        self.entries.write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| {
                let mut builder = MethodTableBuilder::new(T::NAME);
                T::register(&mut builder);
                Arc::new(builder.build())
            }).clone()
    }

    /// Number of interfaces looked up so far
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

lazy_static! {
    static ref GLOBAL: TypeRegistry = TypeRegistry::new();
}

/// The process-wide registry used by [`Mock::new`](crate::Mock::new).
pub fn global() -> &'static TypeRegistry {
    &GLOBAL
}

#[cfg(test)]
mod t {
    use super::*;

    struct Sorter;
    impl Interface for Sorter {
        const NAME: &'static str = "Sorter";
        fn register(methods: &mut MethodTableBuilder) {
            methods.method::<(), usize>("len")
                .method::<(usize, usize), bool>("less")
                .method::<(usize, usize), ()>("swap");
        }
    }

    #[test]
    fn memoized() {
        let registry = TypeRegistry::new();
        let a = registry.lookup::<Sorter>();
        let b = registry.lookup::<Sorter>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, registry.len());
        assert_eq!(3, a.len());
    }

    #[test]
    fn check_ok() {
        let table = TypeRegistry::new().lookup::<Sorter>();
        let sig = table.check::<(usize, usize), bool>("less").unwrap();
        assert_eq!("less", sig.name());
        assert_eq!(2, sig.arity());
    }

    #[test]
    fn check_unknown() {
        let table = TypeRegistry::new().lookup::<Sorter>();
        let e = table.check::<(), usize>("length").unwrap_err();
        assert!(matches!(e, UsageError::UnknownMethod{..}), "{:?}", e);
        assert_eq!("mock: Sorter has no method length", e.to_string());
    }

    #[test]
    fn check_arity() {
        let table = TypeRegistry::new().lookup::<Sorter>();
        let e = table.check::<(usize,), bool>("less").unwrap_err();
        assert!(matches!(e, UsageError::ArityMismatch{expected: 2, actual: 1,
                                                      ..}));
    }

    #[test]
    fn check_types() {
        let table = TypeRegistry::new().lookup::<Sorter>();
        let e = table.check::<(i32, i32), bool>("less").unwrap_err();
        assert!(matches!(e, UsageError::SignatureMismatch{..}));
        let e = table.check::<(usize, usize), u8>("less").unwrap_err();
        assert!(matches!(e, UsageError::SignatureMismatch{..}));
    }
}
