//! Application - owns the context and registries for one named app.

use std::fmt;
use std::sync::Arc;

use appmodel_api::{CommandRule, KeyBinding, MenuItem, MenuNode, OperatingSystem, RegistryEvent};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::commands::{Callback, CommandRegistry, ExecuteOptions};
use crate::config::AppConfig;
use crate::context::Context;
use crate::dispose::{Disposer, DisposerStack};
use crate::error::{AppError, CommandError, MenuError, RegistryError};
use crate::future::CommandFuture;
use crate::inject::{Args, InjectionStore, Resolver};
use crate::keybindings::KeyBindingRegistry;
use crate::menus::MenuRegistry;
use crate::EVENT_CAPACITY;

/// One application: context, command/menu/keybinding registries, injection
/// store and the disposers of everything registered through it.
pub struct Application {
    name: String,
    platform: OperatingSystem,
    context: Arc<Context>,
    commands: CommandRegistry,
    menus: MenuRegistry,
    keybindings: KeyBindingRegistry,
    injection: Arc<InjectionStore>,
    disposers: DisposerStack,
    events: broadcast::Sender<RegistryEvent>,
}

impl Application {
    /// Build an application. Names are only kept unique by [`Applications`].
    ///
    /// With `resolver`, commands resolve injected arguments through it instead
    /// of the application's own [`InjectionStore`].
    fn build(name: &str, config: AppConfig, resolver: Option<Arc<dyn Resolver>>) -> Self {
        let platform = config.platform();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let context = Arc::new(Context::from_map(config.initial_context.clone()));
        context.set_platform(platform);

        let injection = Arc::new(InjectionStore::new(name));
        let resolver = resolver.unwrap_or_else(|| injection.clone() as Arc<dyn Resolver>);
        let commands = CommandRegistry::new(Arc::clone(&context), resolver, events.clone())
            .with_settings(config.command_settings());

        Self {
            name: name.to_string(),
            platform,
            context,
            commands,
            menus: MenuRegistry::new(events.clone()),
            keybindings: KeyBindingRegistry::new(platform, events.clone()),
            injection,
            disposers: DisposerStack::new(),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform(&self) -> OperatingSystem {
        self.platform
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn menus(&self) -> &MenuRegistry {
        &self.menus
    }

    pub fn keybindings(&self) -> &KeyBindingRegistry {
        &self.keybindings
    }

    pub fn injection_store(&self) -> &Arc<InjectionStore> {
        &self.injection
    }

    pub fn raise_synchronous_exceptions(&self) -> bool {
        self.commands.settings().raise_synchronous_exceptions
    }

    pub fn set_raise_synchronous_exceptions(&self, raise: bool) {
        self.commands.set_raise_synchronous_exceptions(raise);
    }

    /// Register the command, menu items and keybindings of `action`.
    ///
    /// Either everything is registered or nothing is: on the first failure the
    /// parts already registered are undone. The returned disposer is also
    /// kept by the application and run on [`Application::dispose`].
    pub fn register_action(&self, action: Action) -> Result<Disposer, RegistryError> {
        let disposer = self.register_action_parts(action)?;
        self.disposers.push(disposer.clone());
        Ok(disposer)
    }

    /// Register several actions as one unit, undone in reverse order.
    pub fn register_actions<I>(&self, actions: I) -> Result<Disposer, RegistryError>
    where
        I: IntoIterator<Item = Action>,
    {
        let mut done = Vec::new();
        for action in actions {
            match self.register_action_parts(action) {
                Ok(disposer) => done.push(disposer),
                Err(e) => {
                    rollback(done);
                    return Err(e);
                }
            }
        }
        let disposer = Disposer::all(format!("{}:actions", self.name), done);
        self.disposers.push(disposer.clone());
        Ok(disposer)
    }

    /// Register a bare command with no menus or keybindings.
    pub fn register_command(
        &self,
        rule: CommandRule,
        callback: Callback,
    ) -> Result<Disposer, RegistryError> {
        self.register_action(Action::new(rule, callback))
    }

    /// Track a host-owned teardown step, run on [`Application::dispose`].
    pub fn add_disposer(&self, disposer: Disposer) {
        self.disposers.push(disposer);
    }

    /// Run every tracked disposer, newest first.
    ///
    /// A failing disposer is logged and skipped. Returns the number of failures.
    pub fn dispose(&self) -> usize {
        let count = self.disposers.len();
        let failed = self.disposers.dispose_all();
        if failed > 0 {
            warn!(app = %self.name, failed, count, "some disposers failed");
        } else {
            debug!(app = %self.name, count, "disposed application");
        }
        failed
    }

    /// Execute a command with the application's settings.
    pub fn execute_command(&self, id: &str, args: Args) -> Result<CommandFuture, CommandError> {
        self.commands.execute(id, args)
    }

    pub fn execute_command_with(
        &self,
        id: &str,
        args: Args,
        options: ExecuteOptions,
    ) -> Result<CommandFuture, CommandError> {
        self.commands.execute_with(id, args, options)
    }

    /// Resolve `menu_id` against the application's context and commands.
    pub fn resolve_menu(&self, menu_id: &str) -> Result<Vec<MenuNode>, MenuError> {
        self.menus.resolve_menu(menu_id, self.context.as_ref(), Some(&self.commands))
    }

    /// The command `pressed` triggers in the current context.
    pub fn resolve_keybinding(&self, pressed: &KeyBinding) -> Option<String> {
        self.keybindings.resolve(pressed, self.context.as_ref())
    }

    /// Subscribe to registry events of this application.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn register_action_parts(&self, action: Action) -> Result<Disposer, RegistryError> {
        let Action { rule, callback, menus, keybindings } = action;
        let id = rule.id.clone();
        let mut parts = vec![self.commands.register(rule.clone(), callback)?];

        for menu in &menus {
            let item = MenuItem::command(&rule, menu);
            match self.menus.append_menu_items(&menu.id, [item]) {
                Ok(disposer) => parts.push(disposer),
                Err(e) => {
                    rollback(parts);
                    return Err(e);
                }
            }
        }
        for keybinding in &keybindings {
            match self.keybindings.register(keybinding, &id) {
                Ok(disposer) => parts.push(disposer),
                Err(e) => {
                    rollback(parts);
                    return Err(e);
                }
            }
        }

        debug!(
            app = %self.name,
            action = %id,
            menus = menus.len(),
            keybindings = keybindings.len(),
            "registered action"
        );
        Ok(Disposer::all(format!("action:{}", id), parts))
    }
}

/// Undo a partial registration, newest first.
fn rollback(parts: Vec<Disposer>) {
    for part in parts.iter().rev() {
        if let Err(e) = part.dispose() {
            warn!(label = part.label(), "rollback failed: {:#}", e);
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("platform", &self.platform)
            .field("commands", &self.commands.len())
            .field("menus", &self.menus.menu_ids())
            .field("keybindings", &self.keybindings.len())
            .field("disposers", &self.disposers.len())
            .finish()
    }
}

/// Name to [`Application`] registry.
///
/// Owned by the composition root and passed to whoever needs to look up
/// applications. Creation and destruction are serialized.
pub struct Applications {
    apps: Mutex<IndexMap<String, Arc<Application>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Applications {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { apps: Mutex::new(IndexMap::new()), events }
    }

    /// The application named `name`, created with defaults if absent.
    pub fn get_or_create(&self, name: &str) -> Arc<Application> {
        let mut apps = self.apps.lock();
        if let Some(app) = apps.get(name) {
            return Arc::clone(app);
        }
        let app = Arc::new(Application::build(name, AppConfig::default(), None));
        apps.insert(name.to_string(), Arc::clone(&app));
        info!(app = %name, "created application");
        app
    }

    /// Create `name` with `config`. Fails if the name is taken.
    pub fn create(&self, name: &str, config: AppConfig) -> Result<Arc<Application>, AppError> {
        self.create_with(name, config, None)
    }

    /// Like [`Applications::create`], resolving injected arguments through
    /// `resolver` when given.
    pub fn create_with(
        &self,
        name: &str,
        config: AppConfig,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<Arc<Application>, AppError> {
        let mut apps = self.apps.lock();
        if apps.contains_key(name) {
            return Err(AppError::DuplicateName(name.to_string()));
        }
        let app = Arc::new(Application::build(name, config, resolver));
        apps.insert(name.to_string(), Arc::clone(&app));
        info!(app = %name, "created application");
        Ok(app)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Application>> {
        self.apps.lock().get(name).cloned()
    }

    /// Names in creation order.
    pub fn names(&self) -> Vec<String> {
        self.apps.lock().keys().cloned().collect()
    }

    /// Dispose `name`, clear its injection store and free the name.
    ///
    /// Unknown names are ignored. Returns whether an application was destroyed.
    pub fn destroy(&self, name: &str) -> bool {
        let Some(app) = self.apps.lock().shift_remove(name) else {
            return false;
        };
        app.dispose();
        app.injection.clear();

        let event = RegistryEvent::Destroyed { app: name.to_string() };
        let _ = app.events.send(event.clone());
        let _ = self.events.send(event);
        info!(app = %name, "destroyed application");
        true
    }

    /// Subscribe to [`RegistryEvent::Destroyed`] notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

impl Default for Applications {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Applications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applications").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appmodel_api::{KeyBindingRule, MenuRule, Value};

    fn noop() -> Callback {
        Callback::new(|_| Ok(Value::Null))
    }

    fn linux_app(apps: &Applications, name: &str) -> Arc<Application> {
        let config = AppConfig { platform: Some(OperatingSystem::Linux), ..Default::default() };
        apps.create(name, config).unwrap()
    }

    #[test]
    fn test_platform_keys_set_on_construction() {
        let apps = Applications::new();
        let app = linux_app(&apps, "p");
        assert_eq!(app.context().get("is_linux"), Value::Bool(true));
        assert_eq!(app.context().get("is_mac"), Value::Bool(false));
    }

    #[test]
    fn test_initial_context_applied() {
        let apps = Applications::new();
        let mut config = AppConfig::default();
        config.initial_context.insert("theme".into(), "dark".into());
        let app = apps.create("ctx", config).unwrap();
        assert_eq!(app.context().get("theme"), Value::from("dark"));
    }

    #[test]
    fn test_duplicate_name() {
        let apps = Applications::new();
        let _a = apps.get_or_create("dup");
        assert!(matches!(
            apps.create("dup", AppConfig::default()),
            Err(AppError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_failed_action_rolls_back() {
        let apps = Applications::new();
        let app = linux_app(&apps, "rb");
        let action = Action::new(CommandRule::new("a", "A"), noop())
            .menu(MenuRule::new("file"))
            .keybinding(KeyBindingRule::new("Ctrl+A"))
            .keybinding(KeyBindingRule::new("Ctrl+Nope"));
        assert!(matches!(
            app.register_action(action),
            Err(RegistryError::InvalidKeybinding { .. })
        ));
        assert!(app.commands().is_empty());
        assert!(app.menus().menu_ids().is_empty());
        assert!(app.keybindings().is_empty());
    }

    #[test]
    fn test_failed_batch_rolls_back_earlier_actions() {
        let apps = Applications::new();
        let app = linux_app(&apps, "batch");
        let result = app.register_actions([
            Action::new(CommandRule::new("a", "A"), noop()),
            Action::new(CommandRule::new("a", "Duplicate"), noop()),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateId(_))));
        assert!(app.commands().is_empty());
    }

    #[test]
    fn test_custom_resolver() {
        use crate::inject::Injected;
        use std::any::TypeId;

        struct Fixed;
        impl Resolver for Fixed {
            fn resolve(&self, ty: TypeId) -> Option<Injected> {
                (ty == TypeId::of::<u8>()).then(|| Arc::new(42u8) as Injected)
            }
        }

        let apps = Applications::new();
        let app = apps.create_with("r", AppConfig::default(), Some(Arc::new(Fixed))).unwrap();
        let cb = Callback::new(|args| Ok(Value::Int(i64::from(*args.require::<u8>("n")?))))
            .param::<u8>("n");
        let _d = app.register_command(CommandRule::new("n", "N"), cb).unwrap();
        assert_eq!(app.execute_command("n", Args::new()).unwrap().wait().unwrap(), Value::Int(42));
    }

    #[test]
    fn test_destroy_emits_and_frees_name() {
        let apps = Applications::new();
        let mut rx = apps.subscribe();
        let _app = apps.get_or_create("gone");
        assert!(apps.destroy("gone"));
        assert_eq!(rx.try_recv().unwrap(), RegistryEvent::Destroyed { app: "gone".into() });
        assert!(apps.get("gone").is_none());
        assert!(!apps.destroy("gone"));
    }

    #[test]
    fn test_undone_actions_leave_no_tracked_disposers() {
        let apps = Applications::new();
        let app = linux_app(&apps, "plugins");
        for _ in 0..1_000 {
            let undo = app
                .register_action(
                    Action::new(CommandRule::new("plugin.run", "Run"), noop())
                        .menu(MenuRule::new("plugins"))
                        .keybinding(KeyBindingRule::new("Ctrl+R")),
                )
                .unwrap();
            undo.dispose().unwrap();
        }
        assert!(app.commands().is_empty());
        assert_eq!(app.disposers.len(), 0);
        assert!(app.disposers.labels().is_empty());
        assert_eq!(app.dispose(), 0);
    }
}
