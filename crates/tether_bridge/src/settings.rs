//! Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tether_engine::EngineSettings;

use crate::error::BridgeError;
use crate::keepalive::SlotStrategy;

/// Bridge settings, loadable from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub engine: EngineSettings,
    pub arena: ArenaSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    pub strategy: SlotStrategy,
    /// Slots reserved up front.
    pub initial_capacity: usize,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            strategy: SlotStrategy::Reuse,
            initial_capacity: 64,
        }
    }
}

impl BridgeSettings {
    pub fn from_json_str(json: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = BridgeSettings::from_json_str(r#"{ "arena": { "strategy": "monotonic" } }"#).unwrap();
        assert_eq!(settings.arena.strategy, SlotStrategy::Monotonic);
        assert_eq!(settings.arena.initial_capacity, 64);
        assert_eq!(settings.engine, EngineSettings::default());
    }

    #[test]
    fn bad_json_is_a_settings_error() {
        let err = BridgeSettings::from_json_str(r#"{ "arena": { "strategy": "sometimes" } }"#).unwrap_err();
        assert!(matches!(err, BridgeError::Settings(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let path = std::env::temp_dir().join(format!("tether-settings-{}.json", std::process::id()));
        let written = BridgeSettings {
            arena: ArenaSettings {
                strategy: SlotStrategy::Monotonic,
                initial_capacity: 8,
            },
            ..BridgeSettings::default()
        };
        std::fs::write(&path, written.to_json_string().unwrap()).unwrap();
        let loaded = BridgeSettings::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), written);

        assert!(matches!(BridgeSettings::load(&path), Err(BridgeError::Io(_))));
    }
}
