//! Error types for the registry core.

use appmodel_api::KeyParseError;
use thiserror::Error;

use crate::expr::ParseError;

/// Registration failures. Surfaced to the caller; the registry is unchanged.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("id {0:?} is already registered")]
    DuplicateId(String),

    #[error("ids must not be empty")]
    EmptyId,

    #[error("invalid expression for {owner:?}: {source}")]
    InvalidExpression {
        owner: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid keybinding for {command:?}: {source}")]
    InvalidKeybinding {
        command: String,
        #[source]
        source: KeyParseError,
    },
}

/// Execution-time failures. Never fatal to the registry.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("command not enabled: {0}")]
    NotEnabled(String),

    #[error("command is not a toggle: {0}")]
    NotAToggle(String),

    #[error("cannot inject arguments for {command:?}: {reason}")]
    Injection { command: String, reason: String },

    #[error("command {command:?} failed: {source:#}")]
    Callback {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("command {0:?} was dropped before completing")]
    Canceled(String),
}

/// Structural menu misconfiguration, fatal to the affected resolution only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuError {
    #[error("cyclic submenu reference: {}", path.join(" -> "))]
    Cyclic { path: Vec<String> },
}

/// Application lifecycle failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("application {0:?} already exists; retrieve it with get_or_create")]
    DuplicateName(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
