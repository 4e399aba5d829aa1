//! Context - the mutable key/value store "when" clauses are evaluated against.

use std::collections::BTreeSet;
use std::sync::Arc;

use appmodel_api::{ContextEvent, OperatingSystem, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::expr::Lookup;
use crate::EVENT_CAPACITY;

/// A mutable mapping from key to [`Value`], with change notification.
///
/// Reads of unset keys return `Value::Missing`. A child context (see
/// [`Context::new_child`]) reads through to its parent and shadows it on
/// write. Mutations are last-write-wins; there is no transaction support.
#[derive(Debug)]
pub struct Context {
    values: RwLock<IndexMap<String, Value>>,
    parent: Option<Arc<Context>>,
    events: broadcast::Sender<ContextEvent>,
}

impl Context {
    /// Create an empty root context.
    pub fn new() -> Self {
        Self::from_map(IndexMap::new())
    }

    /// Create a root context pre-populated with `values`.
    pub fn from_map(values: IndexMap<String, Value>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { values: RwLock::new(values), parent: None, events }
    }

    /// Create a child scope that falls back to `parent` for unset keys.
    pub fn new_child(parent: &Arc<Context>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            values: RwLock::new(IndexMap::new()),
            parent: Some(Arc::clone(parent)),
            events,
        }
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// Read `key`, falling back to the parent scope, else `Value::Missing`.
    pub fn get(&self, key: &str) -> Value {
        if let Some(value) = self.values.read().get(key) {
            return value.clone();
        }
        match &self.parent {
            Some(parent) => parent.get(key),
            None => Value::Missing,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
            || self.parent.as_ref().is_some_and(|p| p.contains(key))
    }

    /// Set `key`, returning the previous value in this scope.
    ///
    /// Emits [`ContextEvent::Changed`] when the stored value actually changes.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let previous = {
            let mut values = self.values.write();
            values.insert(key.clone(), value.clone())
        };
        if previous.as_ref() != Some(&value) {
            self.emit(BTreeSet::from([key]));
        }
        previous
    }

    /// Set several keys at once, emitting a single change event.
    pub fn update<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut changed = BTreeSet::new();
        {
            let mut values = self.values.write();
            for (key, value) in entries {
                let key = key.into();
                let value = value.into();
                if values.get(&key) != Some(&value) {
                    changed.insert(key.clone());
                }
                values.insert(key, value);
            }
        }
        if !changed.is_empty() {
            self.emit(changed);
        }
    }

    /// Remove `key` from this scope. The parent scope is untouched.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.values.write().shift_remove(key);
        if removed.is_some() {
            self.emit(BTreeSet::from([key.to_string()]));
        }
        removed
    }

    /// Keys visible from this scope, parent keys first.
    pub fn keys(&self) -> Vec<String> {
        self.snapshot().into_keys().collect()
    }

    /// Flattened copy of every visible key and value.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        let mut merged = self.parent.as_ref().map(|p| p.snapshot()).unwrap_or_default();
        for (key, value) in self.values.read().iter() {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Set the `is_linux` / `is_mac` / `is_windows` keys for `os`.
    pub fn set_platform(&self, os: OperatingSystem) {
        self.update([
            ("is_linux", os.is_linux()),
            ("is_mac", os.is_mac()),
            ("is_windows", os.is_windows()),
        ]);
    }

    /// Subscribe to change events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }

    fn emit(&self, keys: BTreeSet<String>) {
        let _ = self.events.send(ContextEvent::Changed { keys });
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Lookup for Context {
    fn lookup(&self, key: &str) -> Value {
        self.get(key)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn test_unset_key_is_missing() {
        let ctx = Context::new();
        assert_eq!(ctx.get("nope"), Value::Missing);
        assert!(!ctx.contains("nope"));
    }

    #[test]
    fn test_set_emits_changed_keys() {
        let ctx = Context::new();
        let mut rx = ctx.subscribe();
        ctx.set("a", true);
        let ContextEvent::Changed { keys } = rx.try_recv().unwrap();
        assert_eq!(keys, BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_setting_same_value_is_silent() {
        let ctx = Context::new();
        ctx.set("a", 1);
        let mut rx = ctx.subscribe();
        ctx.set("a", 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_update_emits_once() {
        let ctx = Context::new();
        let mut rx = ctx.subscribe();
        ctx.update([("a", 1), ("b", 2)]);
        let ContextEvent::Changed { keys } = rx.try_recv().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_child_reads_through_and_shadows() {
        let parent = Arc::new(Context::new());
        parent.set("theme", "dark");
        let child = Context::new_child(&parent);
        assert_eq!(child.get("theme"), Value::from("dark"));

        child.set("theme", "light");
        assert_eq!(child.get("theme"), Value::from("light"));
        assert_eq!(parent.get("theme"), Value::from("dark"));

        child.remove("theme");
        assert_eq!(child.get("theme"), Value::from("dark"));
    }

    #[test]
    fn test_mutation_visible_to_parsed_expression() {
        let ctx = Context::new();
        let expr = Expr::parse("editor_focused && !read_only").unwrap();
        assert!(!expr.eval(&ctx));
        ctx.set("editor_focused", true);
        assert!(expr.eval(&ctx));
        ctx.set("read_only", true);
        assert!(!expr.eval(&ctx));
    }

    #[test]
    fn test_platform_flags() {
        let ctx = Context::new();
        ctx.set_platform(OperatingSystem::Mac);
        assert_eq!(ctx.get("is_mac"), Value::Bool(true));
        assert_eq!(ctx.get("is_linux"), Value::Bool(false));
        assert_eq!(ctx.get("is_windows"), Value::Bool(false));
    }
}
