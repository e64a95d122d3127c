//! Built-in defaults (layer 1)

use serde_json::Value;

use super::settings::Settings;

/// Built-in default configuration values
#[derive(Debug, Clone, Default)]
pub struct BuiltinDefaults {
    settings: Settings,
}

impl BuiltinDefaults {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Value {
        // Settings is plain data with string keys; serialization cannot fail.
        serde_json::to_value(&self.settings).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["retry"]["max_attempts"], 4);
        assert_eq!(value["retry"]["initial_delay_ms"], 500);
        assert_eq!(value["http"]["connect_timeout_seconds"], 15);
        assert_eq!(value["feed_cache_ttl_seconds"], 3600);
        assert_eq!(value["pinned_db"], "checksums.json");
        assert_eq!(value["verification"]["require_verified"], false);
        assert!(value["http"].get("github_token").is_none());
    }
}
