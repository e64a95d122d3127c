//! Configuration merge system
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Host/user config (`~/.config/toolpin/config.toml`)
//! 3. Repo config (`./.toolpin.toml`, or `--config`)
//! 4. Environment (`TOOLPIN_REQUIRE_VERIFIED`, `TOOLPIN_PINNED_DB`, `GITHUB_TOKEN`)
//! 5. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{
    env_layer, env_layer_from_process, ConfigError, ConfigOrigin, ConfigPaths, ConfigSource,
    EffectiveConfig, ENV_VARS, REPO_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{Settings, VerificationSettings};
