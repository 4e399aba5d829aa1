//! Action: a command together with its menu placements and keybindings.

use appmodel_api::{CommandRule, Icon, KeyBindingRule, MenuRule, ToggleRule};

use crate::commands::Callback;

/// Everything [`Application::register_action`](crate::Application::register_action)
/// needs to wire up one command.
#[derive(Debug, Clone)]
pub struct Action {
    pub rule: CommandRule,
    pub callback: Callback,
    pub menus: Vec<MenuRule>,
    pub keybindings: Vec<KeyBindingRule>,
}

impl Action {
    pub fn new(rule: CommandRule, callback: Callback) -> Self {
        Self { rule, callback, menus: Vec::new(), keybindings: Vec::new() }
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn menu(mut self, menu: MenuRule) -> Self {
        self.menus.push(menu);
        self
    }

    pub fn keybinding(mut self, keybinding: KeyBindingRule) -> Self {
        self.keybindings.push(keybinding);
        self
    }

    pub fn enablement(mut self, when: impl Into<String>) -> Self {
        self.rule.enablement = Some(when.into());
        self
    }

    pub fn icon(mut self, icon: Icon) -> Self {
        self.rule.icon = Some(icon);
        self
    }

    pub fn toggled(mut self, toggle: ToggleRule) -> Self {
        self.rule.toggled = Some(toggle);
        self
    }
}
