use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Extension-wide switches, persisted under the `settings` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_true")]
    pub extension_enabled: bool,
    #[serde(default)]
    pub is_power_user_mode: bool,
    #[serde(default = "default_true")]
    pub show_block_counter: bool,
    /// Premium-only; forced off for free and signed-out users.
    #[serde(default)]
    pub customization_toggle: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            extension_enabled: true,
            is_power_user_mode: false,
            show_block_counter: true,
            customization_toggle: false,
        }
    }
}

/// Overlay state a page agent owns for its tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewState {
    pub enabled: bool,
    pub hidden_count: u64,
}

/// Coordinator-owned snapshot of the global settings.
///
/// Readers never block; writers replace the whole snapshot after the durable
/// write has been acknowledged.
#[derive(Debug, Clone)]
pub struct ExtensionState {
    settings: Arc<ArcSwap<GlobalSettings>>,
}

impl ExtensionState {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn is_filtering_active(&self) -> bool {
        self.settings.load().extension_enabled
    }

    pub fn is_power_user_mode(&self) -> bool {
        self.settings.load().is_power_user_mode
    }

    pub fn snapshot(&self) -> GlobalSettings {
        **self.settings.load()
    }

    pub fn store(&self, settings: GlobalSettings) {
        self.settings.store(Arc::new(settings));
    }
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self::new(GlobalSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_replaces_snapshot_for_all_clones() {
        let state = ExtensionState::default();
        let reader = state.clone();
        assert!(reader.is_filtering_active());

        state.store(GlobalSettings {
            extension_enabled: false,
            is_power_user_mode: true,
            show_block_counter: false,
            customization_toggle: true,
        });
        assert!(!reader.is_filtering_active());
        assert!(reader.is_power_user_mode());
    }

    #[test]
    fn test_settings_missing_fields_use_defaults() {
        let settings: GlobalSettings = serde_json::from_str(r#"{"isPowerUserMode":true}"#).unwrap();
        assert!(settings.extension_enabled);
        assert!(settings.is_power_user_mode);
        assert!(settings.show_block_counter);
        assert!(!settings.customization_toggle);
    }
}
