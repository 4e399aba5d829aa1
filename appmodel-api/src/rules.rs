//! Declarative rules describing commands, menu placement and keybindings.
//!
//! Rules carry "when" clauses as source text. Registries parse them at
//! registration time so malformed clauses fail fast.

use serde::{Deserialize, Serialize};

use crate::keys::OperatingSystem;

/// Icon for a command or submenu, optionally themed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    /// Icon key or path used on dark themes.
    pub dark: Option<String>,
    /// Icon key or path used on light themes.
    pub light: Option<String>,
}

impl Icon {
    /// Same icon for every theme.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self { dark: Some(key.clone()), light: Some(key) }
    }

    pub fn themed(dark: impl Into<String>, light: impl Into<String>) -> Self {
        Self { dark: Some(dark.into()), light: Some(light.into()) }
    }
}

/// Marks a command as a toggle with persisted checked state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRule {
    /// Checked state before the first toggle.
    pub initially_checked: bool,
}

impl ToggleRule {
    pub fn new(initially_checked: bool) -> Self {
        Self { initially_checked }
    }
}

/// Metadata about a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandRule {
    /// Globally unique command id, e.g. `"file.open"`.
    pub id: String,
    /// Title shown in menus and palettes.
    pub title: String,
    /// Shorter title for constrained surfaces (toolbars).
    pub short_title: Option<String>,
    /// Grouping shown as a prefix in command palettes.
    pub category: Option<String>,
    pub tooltip: Option<String>,
    pub status_tip: Option<String>,
    pub icon: Option<Icon>,
    /// "When" clause deciding whether the command may run.
    pub enablement: Option<String>,
    pub toggled: Option<ToggleRule>,
}

impl CommandRule {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_enablement(mut self, when: impl Into<String>) -> Self {
        self.enablement = Some(when.into());
        self
    }

    pub fn with_toggle(mut self, toggle: ToggleRule) -> Self {
        self.toggled = Some(toggle);
        self
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_status_tip(mut self, status_tip: impl Into<String>) -> Self {
        self.status_tip = Some(status_tip.into());
        self
    }

    pub fn with_short_title(mut self, short_title: impl Into<String>) -> Self {
        self.short_title = Some(short_title.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_toggle(&self) -> bool {
        self.toggled.is_some()
    }
}

/// Placement of a command inside a menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuRule {
    /// Menu the command appears in.
    pub id: String,
    /// Sort bucket. Items without a group sort after all grouped items.
    pub group: Option<String>,
    /// Tie-break inside a group. Missing order sorts as `0`.
    pub order: Option<f64>,
    /// "When" clause deciding whether the item is shown.
    pub when: Option<String>,
}

impl MenuRule {
    pub fn new(menu_id: impl Into<String>) -> Self {
        Self {
            id: menu_id.into(),
            ..Default::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }
}

/// Default weight of keybinding rules. Higher weight wins.
pub const DEFAULT_KEYBINDING_WEIGHT: i32 = 0;

/// A keybinding for one command, with optional per-platform overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindingRule {
    /// Binding used when no platform override applies, e.g. `"CtrlCmd+O"`.
    pub primary: Option<String>,
    pub win: Option<String>,
    pub mac: Option<String>,
    pub linux: Option<String>,
    /// "When" clause deciding whether the binding is active.
    pub when: Option<String>,
    /// Priority among bindings for the same chord.
    pub weight: i32,
}

impl KeyBindingRule {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: Some(primary.into()),
            ..Default::default()
        }
    }

    pub fn win(mut self, binding: impl Into<String>) -> Self {
        self.win = Some(binding.into());
        self
    }

    pub fn mac(mut self, binding: impl Into<String>) -> Self {
        self.mac = Some(binding.into());
        self
    }

    pub fn linux(mut self, binding: impl Into<String>) -> Self {
        self.linux = Some(binding.into());
        self
    }

    pub fn when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// The platform override for `os`, if any.
    pub fn platform_override(&self, os: OperatingSystem) -> Option<&str> {
        match os {
            OperatingSystem::Windows => self.win.as_deref(),
            OperatingSystem::Mac => self.mac.as_deref(),
            OperatingSystem::Linux => self.linux.as_deref(),
        }
    }

    /// Binding text that applies on `os`: the override, else the primary.
    ///
    /// The flag is true when the text came from a platform override.
    pub fn for_platform(&self, os: OperatingSystem) -> Option<(&str, bool)> {
        self.platform_override(os)
            .map(|b| (b, true))
            .or_else(|| self.primary.as_deref().map(|b| (b, false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_override_takes_precedence() {
        let rule = KeyBindingRule::new("Ctrl+Q").mac("Cmd+Q");
        assert_eq!(rule.for_platform(OperatingSystem::Mac), Some(("Cmd+Q", true)));
        assert_eq!(rule.for_platform(OperatingSystem::Linux), Some(("Ctrl+Q", false)));
    }

    #[test]
    fn test_rule_without_primary_only_binds_on_override_platform() {
        let rule = KeyBindingRule {
            win: Some("Alt+F4".into()),
            ..Default::default()
        };
        assert!(rule.for_platform(OperatingSystem::Linux).is_none());
        assert_eq!(rule.for_platform(OperatingSystem::Windows), Some(("Alt+F4", true)));
    }

    #[test]
    fn test_command_rule_builder() {
        let rule = CommandRule::new("view.wrap", "Word Wrap")
            .with_toggle(ToggleRule::new(true))
            .with_enablement("editor_focused");
        assert!(rule.is_toggle());
        assert_eq!(rule.enablement.as_deref(), Some("editor_focused"));
    }
}
