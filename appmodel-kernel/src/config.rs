//! Application configuration.

use appmodel_api::{OperatingSystem, Value};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::commands::CommandSettings;
use crate::error::AppError;
use crate::inject::InjectionPolicy;

/// Construction parameters of an [`Application`](crate::Application).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Return callback failures from `execute` immediately, in addition to
    /// the returned future.
    pub raise_synchronous_exceptions: bool,
    /// Executing a disabled command is an error rather than a skipped call.
    pub strict_enablement: bool,
    pub injection: InjectionPolicy,
    /// Platform used for keybindings and the `is_*` context keys.
    /// Defaults to the running OS.
    pub platform: Option<OperatingSystem>,
    /// Context keys set at construction.
    pub initial_context: IndexMap<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            raise_synchronous_exceptions: false,
            strict_enablement: true,
            injection: InjectionPolicy::default(),
            platform: None,
            initial_context: IndexMap::new(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn platform(&self) -> OperatingSystem {
        self.platform.unwrap_or_else(OperatingSystem::current)
    }

    pub(crate) fn command_settings(&self) -> CommandSettings {
        CommandSettings {
            raise_synchronous_exceptions: self.raise_synchronous_exceptions,
            strict_enablement: self.strict_enablement,
            injection: self.injection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::Policy;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.raise_synchronous_exceptions);
        assert!(config.strict_enablement);
        assert_eq!(config.injection.on_unannotated, Policy::Ignore);
    }

    #[test]
    fn test_from_json_partial() {
        let config = AppConfig::from_json(
            r#"{
                "raise_synchronous_exceptions": true,
                "platform": "mac",
                "injection": { "on_unresolved": "warn" },
                "initial_context": { "theme": "dark", "zoom": 2 }
            }"#,
        )
        .unwrap();
        assert!(config.raise_synchronous_exceptions);
        assert!(config.strict_enablement);
        assert_eq!(config.platform(), OperatingSystem::Mac);
        assert_eq!(config.injection.on_unresolved, Policy::Warn);
        assert_eq!(config.injection.on_unannotated, Policy::Ignore);
        assert_eq!(config.initial_context.get("zoom"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(AppConfig::from_json("{ nope"), Err(AppError::Config(_))));
    }
}
