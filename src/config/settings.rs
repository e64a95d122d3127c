//! Typed view of the merged configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolpin_store::{PinnedStore, TrustTier, DEFAULT_BACKUP_RETENTION, DEFAULT_FILE_NAME};

use crate::feed::DEFAULT_FEED_TTL;
use crate::http::{HttpError, HttpSettings, ReqwestClient};
use crate::registry::{RegistryResult, ToolOverride, ToolRegistry};
use crate::retry::{Retrier, RetryPolicy};
use crate::session::Session;
use crate::verify::VerificationPolicy;

/// `[verification]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Disable tier 4 (trust on first use)
    #[serde(default)]
    pub require_verified: bool,

    /// `signature`, `pinned`, `published` or `calculated`. `pinned-or-better`
    /// is the production setting and only rules out tier 4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tier: Option<String>,
}

impl VerificationSettings {
    pub fn minimum_tier(&self) -> Result<Option<TrustTier>, String> {
        self.minimum_tier
            .as_deref()
            .map(|s| s.parse::<TrustTier>().map_err(|e| format!("verification.minimum_tier: {}", e)))
            .transpose()
    }
}

/// Everything the CLI needs, after all layers are merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub retry: RetryPolicy,

    pub http: HttpSettings,

    pub feed_cache_ttl_seconds: u64,

    /// Pinned database location
    pub pinned_db: PathBuf,

    /// Defaults to `.toolpin-backups/` next to the pinned database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    pub backup_retention: usize,

    #[serde(default)]
    pub verification: VerificationSettings,

    /// Per-tool overrides, keyed by tool id
    #[serde(default)]
    pub tools: BTreeMap<String, ToolOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            http: HttpSettings::default(),
            feed_cache_ttl_seconds: DEFAULT_FEED_TTL.as_secs(),
            pinned_db: PathBuf::from(DEFAULT_FILE_NAME),
            backup_dir: None,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            verification: VerificationSettings::default(),
            tools: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;

        if self.http.timeout_seconds == 0 || self.http.timeout_seconds > 3600 {
            return Err("http.timeout_seconds must be in (0, 3600]".to_string());
        }
        if self.http.connect_timeout_seconds == 0 || self.http.connect_timeout_seconds > 300 {
            return Err("http.connect_timeout_seconds must be in (0, 300]".to_string());
        }
        if self.http.user_agent.trim().is_empty() {
            return Err("http.user_agent must not be empty".to_string());
        }
        if self.feed_cache_ttl_seconds > 86400 {
            return Err("feed_cache_ttl_seconds must be at most 86400".to_string());
        }
        if self.backup_retention == 0 {
            return Err("backup_retention must be at least 1".to_string());
        }
        if self.pinned_db.as_os_str().is_empty() {
            return Err("pinned_db must not be empty".to_string());
        }
        self.verification.minimum_tier()?;
        Ok(())
    }

    /// The stricter of `minimum_tier` and `require_verified`.
    pub fn policy(&self) -> VerificationPolicy {
        let mut minimum = self
            .verification
            .minimum_tier()
            .ok()
            .flatten()
            .unwrap_or(TrustTier::Calculated);
        if self.verification.require_verified {
            minimum = minimum.min(TrustTier::Published);
        }
        VerificationPolicy::with_minimum(minimum)
    }

    /// Built-in providers with `[tools.*]` applied.
    pub fn registry(&self) -> RegistryResult<ToolRegistry> {
        let mut registry = ToolRegistry::builtin();
        for (tool, config) in &self.tools {
            registry.configure(tool, config)?;
        }
        Ok(registry)
    }

    pub fn store(&self) -> PinnedStore {
        let store = PinnedStore::new(&self.pinned_db).with_backup_retention(self.backup_retention);
        match &self.backup_dir {
            Some(dir) => store.with_backup_dir(dir),
            None => store,
        }
    }

    pub fn retrier(&self) -> Retrier {
        Retrier::new(self.retry.clone())
    }

    /// Session over the real network.
    pub fn session(&self) -> Result<Session, HttpError> {
        let client = ReqwestClient::new(&self.http)?;
        Ok(Session::new(
            Arc::new(client),
            self.retrier(),
            Duration::from_secs(self.feed_cache_ttl_seconds),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.policy(), VerificationPolicy::permissive());
        assert_eq!(settings.pinned_db, PathBuf::from("checksums.json"));
    }

    #[test]
    fn test_policy_takes_stricter_setting() {
        let mut settings = Settings::default();
        settings.verification.require_verified = true;
        assert_eq!(settings.policy().minimum, TrustTier::Published);

        settings.verification.minimum_tier = Some("pinned-or-better".to_string());
        assert_eq!(settings.policy().minimum, TrustTier::Published);

        settings.verification.minimum_tier = Some("pinned".to_string());
        assert_eq!(settings.policy().minimum, TrustTier::Pinned);

        settings.verification.minimum_tier = Some("calculated".to_string());
        assert_eq!(settings.policy().minimum, TrustTier::Published);
    }

    #[test]
    fn test_invalid_values() {
        let mut settings = Settings::default();
        settings.backup_retention = 0;
        assert!(settings.validate().unwrap_err().contains("backup_retention"));

        let mut settings = Settings::default();
        settings.verification.minimum_tier = Some("paranoid".to_string());
        assert!(settings.validate().unwrap_err().contains("minimum_tier"));

        let mut settings = Settings::default();
        settings.http.connect_timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_tool_override() {
        let mut settings = Settings::default();
        settings.tools.insert("terraform".to_string(), ToolOverride::default());
        assert!(settings.registry().is_err());
    }
}
