//! Menu items and resolved menu trees.

use serde::{Deserialize, Serialize};

use crate::rules::{CommandRule, Icon, MenuRule};

/// A command placed in a menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandItem {
    pub command: CommandRule,
    pub group: Option<String>,
    pub order: Option<f64>,
    pub when: Option<String>,
}

/// A nested menu, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmenuItem {
    /// Id of the menu shown when this item is opened.
    pub submenu: String,
    pub title: String,
    pub icon: Option<Icon>,
    /// "When" clause deciding whether the submenu can be opened.
    pub enablement: Option<String>,
    pub group: Option<String>,
    pub order: Option<f64>,
    pub when: Option<String>,
}

impl SubmenuItem {
    pub fn new(submenu: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            submenu: submenu.into(),
            title: title.into(),
            icon: None,
            enablement: None,
            group: None,
            order: None,
            when: None,
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

/// An explicit separator line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparatorItem {
    pub group: Option<String>,
    pub order: Option<f64>,
}

/// One entry of a menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuItem {
    Command(CommandItem),
    Submenu(SubmenuItem),
    Separator(SeparatorItem),
}

impl MenuItem {
    /// Menu item for `command` placed according to `rule`.
    pub fn command(command: &CommandRule, rule: &MenuRule) -> Self {
        MenuItem::Command(CommandItem {
            command: command.clone(),
            group: rule.group.clone(),
            order: rule.order,
            when: rule.when.clone(),
        })
    }

    pub fn separator() -> Self {
        MenuItem::Separator(SeparatorItem::default())
    }

    pub fn group(&self) -> Option<&str> {
        match self {
            MenuItem::Command(item) => item.group.as_deref(),
            MenuItem::Submenu(item) => item.group.as_deref(),
            MenuItem::Separator(item) => item.group.as_deref(),
        }
    }

    pub fn order(&self) -> Option<f64> {
        match self {
            MenuItem::Command(item) => item.order,
            MenuItem::Submenu(item) => item.order,
            MenuItem::Separator(item) => item.order,
        }
    }

    /// Visibility clause. Separators are always shown.
    pub fn when(&self) -> Option<&str> {
        match self {
            MenuItem::Command(item) => item.when.as_deref(),
            MenuItem::Submenu(item) => item.when.as_deref(),
            MenuItem::Separator(_) => None,
        }
    }

    /// Command id for command items.
    pub fn command_id(&self) -> Option<&str> {
        match self {
            MenuItem::Command(item) => Some(&item.command.id),
            _ => None,
        }
    }

    /// Short label used in logs and tests.
    pub fn label(&self) -> &str {
        match self {
            MenuItem::Command(item) => &item.command.title,
            MenuItem::Submenu(item) => &item.title,
            MenuItem::Separator(_) => "-",
        }
    }
}

impl From<SubmenuItem> for MenuItem {
    fn from(item: SubmenuItem) -> Self {
        MenuItem::Submenu(item)
    }
}

impl From<CommandItem> for MenuItem {
    fn from(item: CommandItem) -> Self {
        MenuItem::Command(item)
    }
}

/// A menu resolved against a context, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuNode {
    Command {
        item: CommandItem,
        enabled: bool,
        /// Checked state for toggle commands.
        checked: Option<bool>,
    },
    Submenu {
        item: SubmenuItem,
        enabled: bool,
        children: Vec<MenuNode>,
    },
    Separator,
}

impl MenuNode {
    pub fn label(&self) -> &str {
        match self {
            MenuNode::Command { item, .. } => &item.command.title,
            MenuNode::Submenu { item, .. } => &item.title,
            MenuNode::Separator => "-",
        }
    }
}
