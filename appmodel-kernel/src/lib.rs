//! App Model Kernel - The registry core.
//!
//! This crate contains the stateful side of the application model:
//! - Expressions ("when" clauses: lexer, parser, evaluator)
//! - Context (key/value store the expressions read)
//! - Command, menu and keybinding registries
//! - Argument injection for command callbacks
//! - Disposers (undo handles for every registration)
//! - Application and the name -> Application registry

pub mod commands;
pub mod context;
pub mod dispose;
pub mod expr;
pub mod inject;
pub mod keybindings;
pub mod menus;

mod action;
mod app;
mod config;
mod error;
mod future;

pub use action::Action;
pub use app::{Application, Applications};
pub use commands::{Callback, CommandRegistry, CommandSettings, ExecuteOptions};
pub use config::AppConfig;
pub use context::Context;
pub use dispose::{Disposer, DisposerStack};
pub use error::{AppError, CommandError, MenuError, RegistryError};
pub use expr::{EvalError, Expr, Lookup, ParseError};
pub use future::{CommandFuture, CommandResult};
pub use inject::{Args, InjectionPolicy, InjectionStore, Policy, Resolver};
pub use keybindings::{KeyBindingInfo, KeyBindingRegistry};
pub use menus::MenuRegistry;

/// Buffer size of every event channel.
pub(crate) const EVENT_CAPACITY: usize = 1024;
