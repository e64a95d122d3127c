//! Tier policy and the per-tier decision rule

use serde::{Deserialize, Serialize};
use toolpin_store::{HashAlgorithm, TrustTier};

/// Minimum tier a verification must reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub minimum: TrustTier,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl VerificationPolicy {
    /// Every tier allowed, including trust on first use.
    pub fn permissive() -> Self {
        Self {
            minimum: TrustTier::Calculated,
        }
    }

    /// Externally verified only: tiers 1-3.
    pub fn require_verified() -> Self {
        Self {
            minimum: TrustTier::Published,
        }
    }

    pub fn with_minimum(minimum: TrustTier) -> Self {
        Self { minimum }
    }

    pub fn allows(&self, tier: TrustTier) -> bool {
        tier.satisfies(self.minimum)
    }

    pub fn is_enforcing(&self) -> bool {
        self.minimum != TrustTier::Calculated
    }
}

/// What one tier found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierProbe {
    /// The tier has nothing to say about this artifact
    NotApplicable { reason: String },

    /// The tier vouches for the artifact. `expected` is the reference digest
    /// where the tier has one.
    Verified {
        algorithm: HashAlgorithm,
        expected: Option<String>,
        source: String,
    },

    Mismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
        source: String,
    },

    BadSignature { reason: String, source: String },
}

impl TierProbe {
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        TierProbe::NotApplicable {
            reason: reason.into(),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            TierProbe::NotApplicable { reason } => reason.clone(),
            TierProbe::Verified { source, .. } => format!("verified against {}", source),
            TierProbe::Mismatch {
                algorithm,
                expected,
                actual,
                source,
            } => format!(
                "{} mismatch against {}: expected {}, got {}",
                algorithm, source, expected, actual
            ),
            TierProbe::BadSignature { reason, source } => format!("{}: {}", source, reason),
        }
    }
}

/// What to do after a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDecision {
    Accept,
    FallThrough,
    Reject,
}

/// The one place tier outcomes are judged. A contradiction from any tier is
/// fatal; later tiers never override it.
pub fn decide(policy: &VerificationPolicy, tier: TrustTier, probe: &TierProbe) -> TierDecision {
    match probe {
        TierProbe::Mismatch { .. } | TierProbe::BadSignature { .. } => TierDecision::Reject,
        TierProbe::NotApplicable { .. } => TierDecision::FallThrough,
        TierProbe::Verified { .. } if policy.allows(tier) => TierDecision::Accept,
        TierProbe::Verified { .. } => TierDecision::FallThrough,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Accepted,
    NotApplicable,
    Rejected,
    /// Below the policy minimum, never evaluated
    Skipped,
}

/// One line of the tier walk, kept in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: TrustTier,
    pub result: AttemptResult,
    pub detail: String,
}

impl TierAttempt {
    pub fn new(tier: TrustTier, result: AttemptResult, detail: impl Into<String>) -> Self {
        Self {
            tier,
            result,
            detail: detail.into(),
        }
    }

    pub fn skipped(tier: TrustTier, policy: &VerificationPolicy) -> Self {
        Self::new(
            tier,
            AttemptResult::Skipped,
            format!("weaker than required {}", policy.minimum),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified() -> TierProbe {
        TierProbe::Verified {
            algorithm: HashAlgorithm::Sha256,
            expected: Some("a".repeat(64)),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_policy_allows() {
        let strict = VerificationPolicy::require_verified();
        assert!(strict.allows(TrustTier::Signature));
        assert!(strict.allows(TrustTier::Published));
        assert!(!strict.allows(TrustTier::Calculated));
        assert!(strict.is_enforcing());

        let pinned = VerificationPolicy::with_minimum(TrustTier::Pinned);
        assert!(!pinned.allows(TrustTier::Published));

        assert!(!VerificationPolicy::default().is_enforcing());
    }

    #[test]
    fn test_decide() {
        let policy = VerificationPolicy::permissive();
        assert_eq!(decide(&policy, TrustTier::Pinned, &verified()), TierDecision::Accept);
        assert_eq!(
            decide(&policy, TrustTier::Signature, &TierProbe::not_applicable("none")),
            TierDecision::FallThrough
        );
        let mismatch = TierProbe::Mismatch {
            algorithm: HashAlgorithm::Sha256,
            expected: "a".repeat(64),
            actual: "b".repeat(64),
            source: "publisher".to_string(),
        };
        assert_eq!(decide(&policy, TrustTier::Published, &mismatch), TierDecision::Reject);
    }

    #[test]
    fn test_decide_respects_minimum() {
        let policy = VerificationPolicy::require_verified();
        assert_eq!(decide(&policy, TrustTier::Calculated, &verified()), TierDecision::FallThrough);
        assert_eq!(decide(&policy, TrustTier::Published, &verified()), TierDecision::Accept);
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = TierAttempt::skipped(TrustTier::Calculated, &VerificationPolicy::require_verified());
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["tier"], "calculated");
        assert_eq!(json["result"], "skipped");
    }
}
