//! App Model API - Shared data types for the application model.
//!
//! Everything in here is plain data: context values, key chords, command,
//! menu and keybinding rules, and the events registries publish. The
//! stateful registries live in `appmodel-kernel`.

mod event;
mod keys;
mod menu;
mod rules;
mod value;

pub use event::*;
pub use keys::*;
pub use menu::*;
pub use rules::*;
pub use value::*;
