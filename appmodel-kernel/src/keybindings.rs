//! Keybinding registry: key chords mapped to command ids.
//!
//! When several bindings match a pressed chord, the winner is the one with
//! the highest weight, then a platform override over a primary binding,
//! then the most recently registered.

use std::fmt;
use std::sync::{Arc, Weak};

use appmodel_api::{KeyBinding, KeyBindingRule, KeyCombo, OperatingSystem, RegistryEvent};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::dispose::Disposer;
use crate::error::RegistryError;
use crate::expr::{self, Expr, Lookup};

/// One registered binding, as exposed to renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindingInfo {
    pub binding: KeyBinding,
    pub command_id: String,
    pub when: Option<Expr>,
    pub weight: i32,
    /// True when the binding came from a `win` / `mac` / `linux` override.
    pub platform_specific: bool,
}

struct Entry {
    seq: u64,
    info: KeyBindingInfo,
}

impl Entry {
    fn rank(&self) -> (i32, bool, u64) {
        (self.info.weight, self.info.platform_specific, self.seq)
    }
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    next_seq: u64,
}

/// Keybindings of one application, parsed for one platform.
pub struct KeyBindingRegistry {
    os: OperatingSystem,
    state: Arc<RwLock<State>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl KeyBindingRegistry {
    pub fn new(os: OperatingSystem, events: broadcast::Sender<RegistryEvent>) -> Self {
        Self { os, state: Arc::default(), events }
    }

    pub fn platform(&self) -> OperatingSystem {
        self.os
    }

    /// Bind `command_id` according to `rule` on this registry's platform.
    ///
    /// A rule with neither a primary binding nor an override for the
    /// platform binds nothing and returns a no-op disposer.
    pub fn register(
        &self,
        rule: &KeyBindingRule,
        command_id: &str,
    ) -> Result<Disposer, RegistryError> {
        if command_id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        let Some((text, platform_specific)) = rule.for_platform(self.os) else {
            tracing::debug!(command = %command_id, os = ?self.os, "no keybinding for platform");
            return Ok(Disposer::noop(format!("keybinding:{}", command_id)));
        };
        let binding = KeyBinding::parse_for(text, self.os).map_err(|source| {
            RegistryError::InvalidKeybinding { command: command_id.to_string(), source }
        })?;
        let when = expr::parse_optional(rule.when.as_deref()).map_err(|source| {
            RegistryError::InvalidExpression { owner: command_id.to_string(), source }
        })?;

        let seq = {
            let mut state = self.state.write();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.entries.push(Entry {
                seq,
                info: KeyBindingInfo {
                    binding: binding.clone(),
                    command_id: command_id.to_string(),
                    when,
                    weight: rule.weight,
                    platform_specific,
                },
            });
            seq
        };
        tracing::debug!(command = %command_id, binding = %binding, "registered keybinding");
        self.emit(command_id);

        let command_id = command_id.to_string();
        let weak: Weak<RwLock<State>> = Arc::downgrade(&self.state);
        let events = self.events.clone();
        Ok(Disposer::new(format!("keybinding:{}", command_id), move || {
            let Some(state) = weak.upgrade() else {
                return Ok(());
            };
            let removed = {
                let mut state = state.write();
                let before = state.entries.len();
                state.entries.retain(|e| e.seq != seq);
                before != state.entries.len()
            };
            if removed {
                tracing::debug!(command = %command_id, "removed keybinding");
                let _ = events.send(RegistryEvent::KeybindingsChanged {
                    command_ids: vec![command_id],
                });
            }
            Ok(())
        }))
    }

    /// The command bound to `pressed` whose `when` clause holds in `ctx`.
    pub fn resolve(&self, pressed: &KeyBinding, ctx: &dyn Lookup) -> Option<String> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|e| e.info.binding == *pressed)
            .filter(|e| expr::eval_optional(e.info.when.as_ref(), ctx))
            .max_by_key(|e| e.rank())
            .map(|e| e.info.command_id.clone())
    }

    /// Whether `pressed` is the start of a longer registered chord, so a
    /// dispatcher should wait for the next combo.
    pub fn is_chord_prefix(&self, pressed: &[KeyCombo]) -> bool {
        self.state.read().entries.iter().any(|e| {
            let parts = e.info.binding.parts();
            parts.len() > pressed.len() && parts.starts_with(pressed)
        })
    }

    /// The preferred binding of `command_id`, ignoring `when` clauses.
    ///
    /// This is what a menu shows next to the command.
    pub fn get_keybinding_for_command(&self, command_id: &str) -> Option<KeyBindingInfo> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.info.command_id == command_id)
            .max_by_key(|e| e.rank())
            .map(|e| e.info.clone())
    }

    /// Every binding of `command_id`, in registration order.
    pub fn for_command(&self, command_id: &str) -> Vec<KeyBindingInfo> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|e| e.info.command_id == command_id)
            .map(|e| e.info.clone())
            .collect()
    }

    /// Every binding, in registration order.
    pub fn iter(&self) -> Vec<KeyBindingInfo> {
        self.state.read().entries.iter().map(|e| e.info.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, command_id: &str) {
        let _ = self.events.send(RegistryEvent::KeybindingsChanged {
            command_ids: vec![command_id.to_string()],
        });
    }
}

impl fmt::Debug for KeyBindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBindingRegistry")
            .field("os", &self.os)
            .field("len", &self.len())
            .finish()
    }
}
