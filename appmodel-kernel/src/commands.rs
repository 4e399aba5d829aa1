//! Command registry: command metadata, callbacks, enablement and toggles.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use appmodel_api::{CommandRule, RegistryEvent, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::context::Context;
use crate::dispose::{Disposer, panic_message};
use crate::error::{CommandError, RegistryError};
use crate::expr::{self, Expr};
use crate::future::{CommandFuture, CommandResult};
use crate::inject::{Args, InjectionPolicy, Param, ParamType, Resolver, inject};

type CallbackFn = dyn Fn(&Args) -> anyhow::Result<Value> + Send + Sync;

/// The implementation of a command plus the parameters it wants injected.
#[derive(Clone)]
pub struct Callback {
    params: Vec<Param>,
    func: Arc<CallbackFn>,
    inject: bool,
}

impl Callback {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self { params: Vec::new(), func: Arc::new(func), inject: true }
    }

    /// Declare a typed parameter, filled from the resolver when the caller
    /// does not pass it.
    pub fn param<T: Any + Send + Sync>(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param { name: name.into(), ty: Some(ParamType::of::<T>()) });
        self
    }

    /// Declare a parameter with no type to resolve by.
    pub fn unannotated(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param { name: name.into(), ty: None });
        self
    }

    /// Never inject; the callback sees exactly the caller's arguments.
    pub fn without_injection(mut self) -> Self {
        self.inject = false;
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn injects(&self) -> bool {
        self.inject
    }

    pub fn call(&self, args: &Args) -> anyhow::Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("params", &self.params)
            .field("inject", &self.inject)
            .finish()
    }
}

/// Per-call execution switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run the callback on a worker and return immediately.
    pub asynchronous: bool,
    /// Overrides the registry-wide setting for this call.
    pub raise_synchronous_exceptions: Option<bool>,
}

impl ExecuteOptions {
    pub fn asynchronous() -> Self {
        Self { asynchronous: true, raise_synchronous_exceptions: None }
    }

    pub fn raising(raise: bool) -> Self {
        Self { asynchronous: false, raise_synchronous_exceptions: Some(raise) }
    }
}

/// Registry-wide execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSettings {
    /// Return callback failures as `Err` from `execute` instead of only
    /// through the future.
    pub raise_synchronous_exceptions: bool,
    /// Fail `execute` of a disabled command. When false the command is
    /// skipped and the future resolves to `NotEnabled`.
    pub strict_enablement: bool,
    pub injection: InjectionPolicy,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            raise_synchronous_exceptions: false,
            strict_enablement: true,
            injection: InjectionPolicy::default(),
        }
    }
}

struct Entry {
    seq: u64,
    rule: CommandRule,
    callback: Callback,
    enablement: Option<Expr>,
    checked: Option<bool>,
}

#[derive(Default)]
struct State {
    entries: IndexMap<String, Entry>,
    next_seq: u64,
}

/// All commands of one application, keyed by id.
pub struct CommandRegistry {
    state: Arc<RwLock<State>>,
    settings: RwLock<CommandSettings>,
    context: Arc<Context>,
    resolver: Arc<dyn Resolver>,
    events: broadcast::Sender<RegistryEvent>,
}

impl CommandRegistry {
    pub fn new(
        context: Arc<Context>,
        resolver: Arc<dyn Resolver>,
        events: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            state: Arc::default(),
            settings: RwLock::new(CommandSettings::default()),
            context,
            resolver,
            events,
        }
    }

    pub fn with_settings(self, settings: CommandSettings) -> Self {
        *self.settings.write() = settings;
        self
    }

    pub fn settings(&self) -> CommandSettings {
        *self.settings.read()
    }

    pub fn set_raise_synchronous_exceptions(&self, raise: bool) {
        self.settings.write().raise_synchronous_exceptions = raise;
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Register a command.
    ///
    /// The enablement clause is parsed here so a bad clause fails now rather
    /// than at execution. The returned disposer removes exactly this entry;
    /// it does nothing if the id was since unregistered and registered again.
    pub fn register(
        &self,
        rule: CommandRule,
        callback: Callback,
    ) -> Result<Disposer, RegistryError> {
        if rule.id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        let enablement = expr::parse_optional(rule.enablement.as_deref()).map_err(|source| {
            RegistryError::InvalidExpression { owner: rule.id.clone(), source }
        })?;

        let id = rule.id.clone();
        let seq = {
            let mut state = self.state.write();
            if state.entries.contains_key(&id) {
                return Err(RegistryError::DuplicateId(id));
            }
            state.next_seq += 1;
            let seq = state.next_seq;
            let checked = rule.toggled.as_ref().map(|t| t.initially_checked);
            state.entries.insert(id.clone(), Entry { seq, rule, callback, enablement, checked });
            seq
        };
        tracing::debug!(command = %id, "registered command");
        let _ = self.events.send(RegistryEvent::CommandsChanged { ids: vec![id.clone()] });

        let weak: Weak<RwLock<State>> = Arc::downgrade(&self.state);
        let events = self.events.clone();
        Ok(Disposer::new(format!("command:{}", id), move || {
            let Some(state) = weak.upgrade() else {
                return Ok(());
            };
            let removed = {
                let mut state = state.write();
                if state.entries.get(&id).is_some_and(|e| e.seq == seq) {
                    state.entries.shift_remove(&id).is_some()
                } else {
                    false
                }
            };
            if removed {
                tracing::debug!(command = %id, "unregistered command");
                let _ = events.send(RegistryEvent::CommandsChanged { ids: vec![id] });
            }
            Ok(())
        }))
    }

    /// Remove `id` regardless of who registered it.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.state.write().entries.shift_remove(id).is_some();
        if removed {
            tracing::debug!(command = %id, "unregistered command");
            let _ = self.events.send(RegistryEvent::CommandsChanged { ids: vec![id.to_string()] });
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<CommandRule> {
        self.state.read().entries.get(id).map(|e| e.rule.clone())
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Registered rules in registration order.
    pub fn rules(&self) -> Vec<CommandRule> {
        self.state.read().entries.values().map(|e| e.rule.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Whether `id` exists and its enablement clause holds in the context.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.is_enabled_in(id, self.context.as_ref())
    }

    /// Like [`CommandRegistry::is_enabled`], against another lookup.
    pub fn is_enabled_in(&self, id: &str, ctx: &dyn expr::Lookup) -> bool {
        let enablement = match self.state.read().entries.get(id) {
            Some(entry) => entry.enablement.clone(),
            None => return false,
        };
        expr::eval_optional(enablement.as_ref(), ctx)
    }

    /// Checked state of a toggle command; `None` for other commands.
    pub fn is_checked(&self, id: &str) -> Option<bool> {
        self.state.read().entries.get(id).and_then(|e| e.checked)
    }

    /// Flip the checked state of a toggle command, returning the new state.
    pub fn toggle(&self, id: &str) -> Result<bool, CommandError> {
        flip(&self.state, &self.events, id)
    }

    /// Execute with the registry-wide settings, synchronously.
    pub fn execute(&self, id: &str, args: Args) -> Result<CommandFuture, CommandError> {
        self.execute_with(id, args, ExecuteOptions::default())
    }

    /// Execute `id`.
    ///
    /// Lookup, enablement and injection failures are returned as `Err`.
    /// A failing callback is always reported through the future, and also
    /// as `Err` when synchronous exceptions are raised. Toggle commands flip
    /// their checked state once the callback succeeds; a failed or panicked
    /// callback leaves it unchanged.
    pub fn execute_with(
        &self,
        id: &str,
        mut args: Args,
        options: ExecuteOptions,
    ) -> Result<CommandFuture, CommandError> {
        let settings = self.settings();
        let (callback, enablement, is_toggle) = {
            let state = self.state.read();
            let entry = state
                .entries
                .get(id)
                .ok_or_else(|| CommandError::NotFound(id.to_string()))?;
            (entry.callback.clone(), entry.enablement.clone(), entry.checked.is_some())
        };

        if !expr::eval_optional(enablement.as_ref(), self.context.as_ref()) {
            if settings.strict_enablement {
                return Err(CommandError::NotEnabled(id.to_string()));
            }
            tracing::debug!(command = %id, "skipping disabled command");
            return Ok(CommandFuture::ready(id, Err(CommandError::NotEnabled(id.to_string()))));
        }

        if callback.injects() {
            inject(callback.params(), &mut args, self.resolver.as_ref(), settings.injection)
                .map_err(|unfilled| CommandError::Injection {
                    command: id.to_string(),
                    reason: unfilled.to_string(),
                })?;
        }

        tracing::debug!(command = %id, asynchronous = options.asynchronous, "executing command");
        if options.asynchronous {
            let command = id.to_string();
            let toggle = is_toggle.then(|| (Arc::downgrade(&self.state), self.events.clone()));
            return Ok(CommandFuture::spawn(id, move || {
                let result = invoke(&command, &callback, &args);
                if result.is_ok() {
                    if let Some((weak, events)) = toggle {
                        if let Some(state) = weak.upgrade() {
                            flip_after_success(&state, &events, &command);
                        }
                    }
                }
                result
            }));
        }

        let result = invoke(id, &callback, &args);
        if result.is_ok() && is_toggle {
            flip_after_success(&self.state, &self.events, id);
        }
        match result {
            Ok(value) => Ok(CommandFuture::ready(id, Ok(value))),
            Err(err) => {
                let raise = options
                    .raise_synchronous_exceptions
                    .unwrap_or(settings.raise_synchronous_exceptions);
                if raise {
                    Err(err)
                } else {
                    tracing::debug!(command = %id, "command failed: {}", err);
                    Ok(CommandFuture::ready(id, Err(err)))
                }
            }
        }
    }

    /// Subscribe to registry events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("ids", &self.ids())
            .field("settings", &self.settings())
            .finish()
    }
}

fn flip(
    state: &RwLock<State>,
    events: &broadcast::Sender<RegistryEvent>,
    id: &str,
) -> Result<bool, CommandError> {
    let checked = {
        let mut state = state.write();
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| CommandError::NotFound(id.to_string()))?;
        let checked = entry
            .checked
            .as_mut()
            .ok_or_else(|| CommandError::NotAToggle(id.to_string()))?;
        *checked = !*checked;
        *checked
    };
    tracing::debug!(command = %id, checked, "toggled command");
    let _ = events.send(RegistryEvent::ToggleChanged { id: id.to_string(), checked });
    Ok(checked)
}

/// Flip a toggle after its callback ran. The command may have been
/// unregistered while the callback ran; that is not an error.
fn flip_after_success(state: &RwLock<State>, events: &broadcast::Sender<RegistryEvent>, id: &str) {
    if let Err(e) = flip(state, events, id) {
        tracing::debug!(command = %id, "toggle not flipped: {}", e);
    }
}

/// Run a callback, turning errors and panics into [`CommandError::Callback`].
fn invoke(id: &str, callback: &Callback, args: &Args) -> CommandResult {
    let outcome = catch_unwind(AssertUnwindSafe(|| callback.call(args))).unwrap_or_else(|payload| {
        Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
    });
    outcome.map_err(|source| CommandError::Callback { command: id.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::InjectionStore;
    use appmodel_api::ToggleRule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> (CommandRegistry, Arc<InjectionStore>) {
        let store = Arc::new(InjectionStore::new("test"));
        let (tx, _) = broadcast::channel(64);
        let registry = CommandRegistry::new(Arc::new(Context::new()), store.clone(), tx);
        (registry, store)
    }

    fn returns(value: i64) -> Callback {
        Callback::new(move |_| Ok(Value::Int(value)))
    }

    #[test]
    fn test_register_and_execute() {
        let (reg, _) = registry();
        let _d = reg.register(CommandRule::new("a", "A"), returns(7)).unwrap();
        assert_eq!(reg.execute("a", Args::new()).unwrap().wait().unwrap(), Value::Int(7));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (reg, _) = registry();
        let _d = reg.register(CommandRule::new("a", "A"), returns(1)).unwrap();
        let err = reg.register(CommandRule::new("a", "Again"), returns(2)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "a"));
        assert_eq!(reg.get("a").unwrap().title, "A");
    }

    #[test]
    fn test_empty_id_rejected() {
        let (reg, _) = registry();
        assert!(matches!(
            reg.register(CommandRule::new("", "Nameless"), returns(0)),
            Err(RegistryError::EmptyId)
        ));
    }

    #[test]
    fn test_bad_enablement_fails_at_registration() {
        let (reg, _) = registry();
        let rule = CommandRule::new("a", "A").with_enablement("a &&");
        assert!(matches!(
            reg.register(rule, returns(0)),
            Err(RegistryError::InvalidExpression { .. })
        ));
        assert!(!reg.contains("a"));
    }

    #[test]
    fn test_stale_disposer_leaves_new_registration() {
        let (reg, _) = registry();
        let first = reg.register(CommandRule::new("a", "First"), returns(1)).unwrap();
        assert!(reg.unregister("a"));
        let _second = reg.register(CommandRule::new("a", "Second"), returns(2)).unwrap();
        first.dispose().unwrap();
        assert_eq!(reg.get("a").unwrap().title, "Second");
    }

    #[test]
    fn test_not_found() {
        let (reg, _) = registry();
        assert!(matches!(reg.execute("cmd.notfound", Args::new()), Err(CommandError::NotFound(_))));
    }

    #[test]
    fn test_disabled_command() {
        let (reg, _) = registry();
        let rule = CommandRule::new("save", "Save").with_enablement("dirty");
        let _d = reg.register(rule, returns(1)).unwrap();
        assert!(!reg.is_enabled("save"));
        assert!(matches!(reg.execute("save", Args::new()), Err(CommandError::NotEnabled(_))));

        reg.context().set("dirty", true);
        assert!(reg.is_enabled("save"));
        assert!(reg.execute("save", Args::new()).is_ok());
    }

    #[test]
    fn test_lenient_enablement_skips_callback() {
        let (reg, _) = registry();
        let reg =
            reg.with_settings(CommandSettings { strict_enablement: false, ..Default::default() });
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let cb = Callback::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let _d = reg.register(CommandRule::new("a", "A").with_enablement("never"), cb).unwrap();
        let result = reg.execute("a", Args::new()).unwrap().wait();
        assert!(matches!(result, Err(CommandError::NotEnabled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_raise_synchronous_exceptions() {
        let (reg, _) = registry();
        let _d = reg
            .register(CommandRule::new("bad", "Bad"), Callback::new(|_| anyhow::bail!("boom")))
            .unwrap();

        // Captured in the future by default.
        let fut = reg.execute("bad", Args::new()).unwrap();
        assert!(matches!(fut.wait(), Err(CommandError::Callback { .. })));

        // Raised immediately when overridden per call.
        let err = reg.execute_with("bad", Args::new(), ExecuteOptions::raising(true)).unwrap_err();
        assert!(err.to_string().contains("boom"));

        reg.set_raise_synchronous_exceptions(true);
        assert!(reg.execute("bad", Args::new()).is_err());
        assert!(reg.execute_with("bad", Args::new(), ExecuteOptions::raising(false)).is_ok());
    }

    #[test]
    fn test_panicking_callback_is_captured() {
        let (reg, _) = registry();
        let _d = reg
            .register(CommandRule::new("p", "P"), Callback::new(|_| panic!("oops")))
            .unwrap();
        let err = reg.execute("p", Args::new()).unwrap().wait().unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_injection_fills_missing_argument() {
        #[derive(Clone)]
        struct Greeting(&'static str);

        let (reg, store) = registry();
        let _p = store.register_value(Greeting("hello"));
        let cb = Callback::new(|args: &Args| {
            Ok(Value::from(args.require::<Greeting>("greeting")?.0))
        })
        .param::<Greeting>("greeting");
        let _d = reg.register(CommandRule::new("greet", "Greet"), cb).unwrap();

        let out = reg.execute("greet", Args::new()).unwrap().wait().unwrap();
        assert_eq!(out, Value::from("hello"));

        let out = reg
            .execute("greet", Args::new().with("greeting", Greeting("hi")))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(out, Value::from("hi"));
    }

    #[test]
    fn test_unresolvable_argument_fails() {
        struct Missing;
        let (reg, _) = registry();
        let cb = Callback::new(|_| Ok(Value::Null)).param::<Missing>("m");
        let _d = reg.register(CommandRule::new("a", "A"), cb.clone()).unwrap();
        assert!(matches!(reg.execute("a", Args::new()), Err(CommandError::Injection { .. })));

        let _d2 = reg.register(CommandRule::new("b", "B"), cb.without_injection()).unwrap();
        assert!(reg.execute("b", Args::new()).is_ok());
    }

    #[test]
    fn test_toggle() {
        let (reg, _) = registry();
        let mut rx = reg.subscribe();
        let rule = CommandRule::new("wrap", "Word Wrap").with_toggle(ToggleRule::new(false));
        let _d = reg.register(rule, returns(0)).unwrap();
        let _ = rx.try_recv();

        assert_eq!(reg.is_checked("wrap"), Some(false));
        assert!(reg.toggle("wrap").unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            RegistryEvent::ToggleChanged { id: "wrap".into(), checked: true }
        );

        reg.execute("wrap", Args::new()).unwrap().wait().unwrap();
        assert_eq!(reg.is_checked("wrap"), Some(false));
    }

    #[test]
    fn test_failed_toggle_callback_keeps_state() {
        let (reg, _) = registry();
        let rule = CommandRule::new("wrap", "Word Wrap").with_toggle(ToggleRule::new(false));
        let _d = reg.register(rule, Callback::new(|_| anyhow::bail!("no"))).unwrap();
        assert!(reg.execute("wrap", Args::new()).unwrap().wait().is_err());
        assert_eq!(reg.is_checked("wrap"), Some(false));

        let rule = CommandRule::new("panics", "Panics").with_toggle(ToggleRule::new(true));
        let _p = reg.register(rule, Callback::new(|_| panic!("toggle panic"))).unwrap();
        assert!(reg.execute("panics", Args::new()).unwrap().wait().is_err());
        assert_eq!(reg.is_checked("panics"), Some(true));
    }

    #[tokio::test]
    async fn test_asynchronous_toggle_flips_after_callback() {
        let (reg, _) = registry();
        let rule = CommandRule::new("wrap", "Word Wrap").with_toggle(ToggleRule::new(false));
        let _d = reg.register(rule, returns(0)).unwrap();
        let fut = reg.execute_with("wrap", Args::new(), ExecuteOptions::asynchronous()).unwrap();
        fut.await.unwrap();
        assert_eq!(reg.is_checked("wrap"), Some(true));
    }

    #[test]
    fn test_toggle_non_toggle_command() {
        let (reg, _) = registry();
        let _d = reg.register(CommandRule::new("a", "A"), returns(0)).unwrap();
        assert!(matches!(reg.toggle("a"), Err(CommandError::NotAToggle(_))));
        assert_eq!(reg.is_checked("a"), None);
    }

    #[tokio::test]
    async fn test_asynchronous_execution() {
        let (reg, _) = registry();
        let _d = reg.register(CommandRule::new("a", "A"), returns(3)).unwrap();
        let fut = reg.execute_with("a", Args::new(), ExecuteOptions::asynchronous()).unwrap();
        assert_eq!(fut.await.unwrap(), Value::Int(3));
    }

    #[test]
    fn test_events_on_register_and_dispose() {
        let (reg, _) = registry();
        let mut rx = reg.subscribe();
        let d = reg.register(CommandRule::new("a", "A"), returns(0)).unwrap();
        d.dispose().unwrap();
        let expected = RegistryEvent::CommandsChanged { ids: vec!["a".into()] };
        assert_eq!(rx.try_recv().unwrap(), expected);
        assert_eq!(rx.try_recv().unwrap(), expected);
        assert!(reg.is_empty());
    }
}
