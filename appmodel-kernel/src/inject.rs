//! Dependency injection for command arguments.
//!
//! Callbacks declare typed parameters. When a command runs, every parameter
//! the caller did not supply is looked up by type through a [`Resolver`],
//! usually the application's [`InjectionStore`]. What happens when a
//! parameter cannot be filled is decided by an [`InjectionPolicy`].

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dispose::Disposer;

/// A type-erased injected or caller-supplied argument.
pub type Injected = Arc<dyn Any + Send + Sync>;

/// Resolves a value for a requested type.
pub trait Resolver: Send + Sync {
    fn resolve(&self, ty: TypeId) -> Option<Injected>;
}

/// The type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub id: TypeId,
    pub name: &'static str,
}

impl ParamType {
    pub fn of<T: Any>() -> Self {
        Self { id: TypeId::of::<T>(), name: type_name::<T>() }
    }
}

/// A declared callback parameter. `ty == None` marks an unannotated parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Option<ParamType>,
}

/// What to do with a parameter that cannot be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Leave it unfilled.
    #[default]
    Ignore,
    /// Leave it unfilled and log a warning.
    Warn,
    /// Fail the execution.
    Raise,
}

/// Injection behaviour for missing arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionPolicy {
    /// Parameters declared without a type.
    pub on_unannotated: Policy,
    /// Typed parameters the resolver has no provider for.
    pub on_unresolved: Policy,
}

impl Default for InjectionPolicy {
    fn default() -> Self {
        Self { on_unannotated: Policy::Ignore, on_unresolved: Policy::Raise }
    }
}

/// Named arguments passed to a command callback.
#[derive(Clone, Default)]
pub struct Args {
    values: HashMap<String, Injected>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Args::insert`].
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    pub(crate) fn insert_erased(&mut self, name: impl Into<String>, value: Injected) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Borrow argument `name` as `T`. `None` when absent or of another type.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name)?.downcast_ref::<T>()
    }

    /// Like [`Args::get`] but with an error suitable for `?` in callbacks.
    pub fn require<T: Any>(&self, name: &str) -> anyhow::Result<&T> {
        self.get::<T>(name).ok_or_else(|| {
            anyhow::anyhow!("missing argument {:?} of type {}", name, type_name::<T>())
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Args").field("names", &names).finish()
    }
}

type Factory = Arc<dyn Fn() -> Injected + Send + Sync>;

struct ProviderEntry {
    seq: u64,
    type_name: &'static str,
    factory: Factory,
}

#[derive(Default)]
struct StoreState {
    providers: HashMap<TypeId, ProviderEntry>,
    next_seq: u64,
}

/// Per-application registry of providers keyed by type.
pub struct InjectionStore {
    name: String,
    state: Arc<RwLock<StoreState>>,
}

impl InjectionStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Arc::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a factory for `T`, replacing any previous provider of `T`.
    ///
    /// The returned disposer removes this provider only if it is still the
    /// current one.
    pub fn register_provider<T, F>(&self, factory: F) -> Disposer
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let seq = {
            let mut state = self.state.write();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.providers.insert(
                TypeId::of::<T>(),
                ProviderEntry {
                    seq,
                    type_name: type_name::<T>(),
                    factory: Arc::new(move || Arc::new(factory()) as Injected),
                },
            );
            seq
        };
        tracing::debug!(store = %self.name, ty = type_name::<T>(), "registered provider");

        let weak: Weak<RwLock<StoreState>> = Arc::downgrade(&self.state);
        Disposer::new(format!("provider:{}", type_name::<T>()), move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.write();
                if state.providers.get(&TypeId::of::<T>()).is_some_and(|p| p.seq == seq) {
                    state.providers.remove(&TypeId::of::<T>());
                }
            }
            Ok(())
        })
    }

    /// Register a fixed value for `T`. Each resolution hands out a clone.
    pub fn register_value<T>(&self, value: T) -> Disposer
    where
        T: Any + Send + Sync + Clone,
    {
        self.register_provider(move || value.clone())
    }

    /// Resolve a `T` from the registered provider.
    pub fn provide<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve(TypeId::of::<T>())?.downcast::<T>().ok()
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.state.read().providers.contains_key(&TypeId::of::<T>())
    }

    /// Names of the provided types.
    pub fn provided_types(&self) -> Vec<&'static str> {
        self.state.read().providers.values().map(|p| p.type_name).collect()
    }

    /// Drop every provider.
    pub fn clear(&self) {
        self.state.write().providers.clear();
        tracing::debug!(store = %self.name, "cleared injection store");
    }
}

impl Resolver for InjectionStore {
    fn resolve(&self, ty: TypeId) -> Option<Injected> {
        // Clone the factory out so it runs without holding the lock.
        let factory = self.state.read().providers.get(&ty).map(|p| Arc::clone(&p.factory))?;
        Some(factory())
    }
}

impl fmt::Debug for InjectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionStore")
            .field("name", &self.name)
            .field("providers", &self.provided_types())
            .finish()
    }
}

/// Why an argument could not be injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unfilled {
    Unannotated { param: String },
    Unresolved { param: String, type_name: &'static str },
}

impl fmt::Display for Unfilled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unfilled::Unannotated { param } => {
                write!(f, "parameter {:?} has no type to inject", param)
            }
            Unfilled::Unresolved { param, type_name } => {
                write!(f, "no provider for parameter {:?} of type {}", param, type_name)
            }
        }
    }
}

/// Fill the parameters missing from `args` using `resolver`.
pub fn inject(
    params: &[Param],
    args: &mut Args,
    resolver: &dyn Resolver,
    policy: InjectionPolicy,
) -> Result<(), Unfilled> {
    for param in params {
        if args.contains(&param.name) {
            continue;
        }
        let (unfilled, action) = match &param.ty {
            Some(ty) => match resolver.resolve(ty.id) {
                Some(value) => {
                    args.insert_erased(param.name.clone(), value);
                    continue;
                }
                None => (
                    Unfilled::Unresolved { param: param.name.clone(), type_name: ty.name },
                    policy.on_unresolved,
                ),
            },
            None => (
                Unfilled::Unannotated { param: param.name.clone() },
                policy.on_unannotated,
            ),
        };
        match action {
            Policy::Ignore => {}
            Policy::Warn => tracing::warn!("{}", unfilled),
            Policy::Raise => return Err(unfilled),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Document(String);

    #[test]
    fn test_provider_resolves_by_type() {
        let store = InjectionStore::new("test");
        let _d = store.register_value(Document("a.txt".into()));
        assert_eq!(*store.provide::<Document>().unwrap(), Document("a.txt".into()));
        assert!(store.provide::<u32>().is_none());
    }

    #[test]
    fn test_disposer_only_removes_own_provider() {
        let store = InjectionStore::new("test");
        let first = store.register_value(1u32);
        let _second = store.register_value(2u32);
        first.dispose().unwrap();
        assert_eq!(*store.provide::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_inject_fills_only_missing() {
        let store = InjectionStore::new("test");
        let _d = store.register_value(Document("injected".into()));
        let params = vec![Param { name: "doc".into(), ty: Some(ParamType::of::<Document>()) }];

        let mut args = Args::new();
        inject(&params, &mut args, &store, InjectionPolicy::default()).unwrap();
        assert_eq!(args.get::<Document>("doc"), Some(&Document("injected".into())));

        let mut args = Args::new().with("doc", Document("explicit".into()));
        inject(&params, &mut args, &store, InjectionPolicy::default()).unwrap();
        assert_eq!(args.get::<Document>("doc"), Some(&Document("explicit".into())));
    }

    #[test]
    fn test_policies() {
        let store = InjectionStore::new("test");
        let params = vec![
            Param { name: "loose".into(), ty: None },
            Param { name: "doc".into(), ty: Some(ParamType::of::<Document>()) },
        ];

        let err =
            inject(&params, &mut Args::new(), &store, InjectionPolicy::default()).unwrap_err();
        assert!(matches!(err, Unfilled::Unresolved { .. }));

        let lenient =
            InjectionPolicy { on_unannotated: Policy::Ignore, on_unresolved: Policy::Warn };
        let mut args = Args::new();
        inject(&params, &mut args, &store, lenient).unwrap();
        assert!(args.is_empty());

        let strict =
            InjectionPolicy { on_unannotated: Policy::Raise, on_unresolved: Policy::Ignore };
        let err = inject(&params, &mut Args::new(), &store, strict).unwrap_err();
        assert_eq!(err, Unfilled::Unannotated { param: "loose".into() });
    }

    #[test]
    fn test_clear_drops_providers() {
        let store = InjectionStore::new("test");
        let _d = store.register_value(5i64);
        store.clear();
        assert!(!store.contains::<i64>());
    }
}
