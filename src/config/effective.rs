//! Effective configuration with full provenance
//!
//! The effective config captures the merged configuration plus where each
//! layer came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::settings::Settings;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "toolpin/effective_config@1";

/// Repo config file name, looked up in the working directory
pub const REPO_CONFIG_FILE: &str = ".toolpin.toml";

/// Origin of a configuration source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Repo,
    Env,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/env/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Where to look for config files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPaths {
    pub host: Option<PathBuf>,
    pub repo: Option<PathBuf>,
}

impl ConfigPaths {
    /// `$XDG_CONFIG_HOME/toolpin/config.toml` (or `~/.config/...`) and
    /// `./.toolpin.toml`.
    pub fn discover() -> Self {
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")));
        Self {
            host: config_home.map(|d| d.join("toolpin").join("config.toml")),
            repo: Some(PathBuf::from(REPO_CONFIG_FILE)),
        }
    }

    /// Replace the repo layer with an explicit file.
    pub fn with_repo(mut self, path: impl Into<PathBuf>) -> Self {
        self.repo = Some(path.into());
        self
    }
}

/// Environment variables consulted, in the order applied
pub const ENV_VARS: &[&str] = &["TOOLPIN_REQUIRE_VERIFIED", "TOOLPIN_PINNED_DB", "GITHUB_TOKEN"];

/// Build the environment layer from `(name, value)` pairs.
pub fn env_layer<I, K, V>(vars: I) -> Result<Option<Value>, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut layer = json!({});
    let mut any = false;

    for (name, value) in vars {
        let value = value.as_ref();
        match name.as_ref() {
            "TOOLPIN_REQUIRE_VERIFIED" => {
                layer["verification"] = json!({ "require_verified": parse_bool("TOOLPIN_REQUIRE_VERIFIED", value)? });
                any = true;
            }
            "TOOLPIN_PINNED_DB" if !value.is_empty() => {
                layer["pinned_db"] = json!(value);
                any = true;
            }
            "GITHUB_TOKEN" if !value.is_empty() => {
                layer["http"] = json!({ "github_token": value });
                any = true;
            }
            _ => {}
        }
    }

    Ok(any.then_some(layer))
}

/// Environment layer from the process environment.
pub fn env_layer_from_process() -> Result<Option<Value>, ConfigError> {
    env_layer(
        ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (*name, v))),
    )
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ValidationError(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,

    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// The merged configuration object, secrets redacted
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    /// Typed settings, secrets intact
    #[serde(skip)]
    pub settings: Settings,
}

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "private_key", "api_key", "credential"];

impl EffectiveConfig {
    /// Build effective config from layers
    pub fn build(
        paths: &ConfigPaths,
        env_overrides: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        // Layer 1: Built-in defaults
        layers.push(BuiltinDefaults::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        // Layers 2-3: host and repo files, when present
        for (origin, path) in [
            (ConfigOrigin::Host, paths.host.as_deref()),
            (ConfigOrigin::Repo, paths.repo.as_deref()),
        ] {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let (value, digest) = Self::load_toml_file(path)?;
            tracing::debug!(path = %path.display(), ?origin, "config layer loaded");
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        // Layers 4-5: environment, CLI
        for (origin, layer) in [(ConfigOrigin::Env, env_overrides), (ConfigOrigin::Cli, cli_overrides)] {
            if let Some(layer) = layer {
                layers.push(layer);
                sources.push(ConfigSource {
                    origin,
                    path: None,
                    digest: None,
                });
            }
        }

        let mut merged = merge_layers(layers);

        let settings: Settings = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        settings.validate().map_err(ConfigError::ValidationError)?;

        let redactions = Self::redact_secrets(&mut merged);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions,
            settings,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    /// Redact secrets in the config, returning list of redacted paths
    fn redact_secrets(value: &mut Value) -> Vec<String> {
        let mut redactions = Vec::new();
        redact_recursive(value, String::new(), &mut redactions);
        redactions
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON serialization failed: {}", e),
            )
        })?;
        fs::write(path, json)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() && !val.is_null() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
