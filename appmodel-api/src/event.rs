//! Events emitted by the registries and the context to subscribers
//! (rendering backends, tests, etc.)

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Events emitted by an application's registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Commands were registered or unregistered.
    CommandsChanged { ids: Vec<String> },

    /// A toggle command flipped its checked state.
    ToggleChanged { id: String, checked: bool },

    /// Items were added to or removed from these menus.
    MenusChanged { menu_ids: BTreeSet<String> },

    /// Keybindings were added or removed for these commands.
    KeybindingsChanged { command_ids: Vec<String> },

    /// The named application was destroyed and its name freed.
    Destroyed { app: String },
}

/// Events emitted by a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextEvent {
    /// These keys were set or removed.
    Changed { keys: BTreeSet<String> },
}
