//! Tiered verification tests
//!
//! Drives `Verifier::verify_download` end to end over `MockHttp`: tier order,
//! fatal mismatches, enforcement and the trust-on-first-use warning.

mod fixtures;

use std::fs;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use tempfile::TempDir;
use toolpin::http::{HttpError, MockHttp};
use toolpin::registry::{SignatureConfig, ToolOverride};
use toolpin::verify::{
    compute_key_fingerprint, encode_verifying_key, partial_path, AttemptResult, VerificationError,
    VerificationOutcome, TOFU_WARNING,
};
use toolpin::{
    DownloadRequest, ErrorKind, ExitCode, Platform, ToolRegistry, TrustTier, VerificationPolicy, Verifier,
};

use fixtures::{k9s_artifact, k9s_checksums, pinned, python_artifact, record, session, sha256_hex};

const K9S_BYTES: &[u8] = b"k9s 0.50.16 linux amd64 tarball";

fn k9s_request(dir: &TempDir) -> DownloadRequest {
    DownloadRequest::new("k9s", "0.50.16", Platform::Amd64, dir.path().join("k9s.tar.gz"))
}

fn attempt_results(outcome: &VerificationOutcome) -> Vec<(TrustTier, AttemptResult)> {
    outcome.attempts.iter().map(|a| (a.tier, a.result)).collect()
}

#[test]
fn test_pinned_digest_accepts_k9s() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    let db = pinned(vec![record("k9s", "0.50.16", "amd64", &sha256_hex(K9S_BYTES), TrustTier::Published)]);
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive()).with_pinned(&db);
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();

    assert_eq!(outcome.tier, TrustTier::Pinned);
    assert!(outcome.digest_match);
    assert_eq!(outcome.digest, sha256_hex(K9S_BYTES));
    assert_eq!(outcome.expected_digest.as_deref(), Some(sha256_hex(K9S_BYTES).as_str()));
    assert!(outcome.warnings.is_empty());
    assert!(outcome.pinned_db_fingerprint.is_some());
    assert_eq!(
        attempt_results(&outcome),
        vec![
            (TrustTier::Signature, AttemptResult::NotApplicable),
            (TrustTier::Pinned, AttemptResult::Accepted),
        ]
    );
    // Tier 3 never consulted after tier 2 succeeded
    assert_eq!(mock.requests_to(&k9s_checksums("0.50.16")), 0);
    assert_eq!(fs::read(dir.path().join("k9s.tar.gz")).unwrap(), K9S_BYTES);
}

#[test]
fn test_pinned_mismatch_is_fatal() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), b"tampered".to_vec());
    // Publisher would agree with the tampered bytes; it must not be asked.
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!("{}  k9s_Linux_amd64.tar.gz\n", sha256_hex(b"tampered")),
    );
    let db = pinned(vec![record("k9s", "0.50.16", "amd64", &sha256_hex(K9S_BYTES), TrustTier::Published)]);
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = k9s_request(&dir);

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive()).with_pinned(&db);
    let err = verifier.verify_download(&mut session(&mock), &request).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DigestMismatch);
    assert_eq!(err.kind().exit_code(), ExitCode::VerificationFailed);
    assert_eq!(err.tier(), Some(TrustTier::Pinned));
    match err {
        VerificationError::DigestMismatch { expected, actual, .. } => {
            assert_eq!(expected, sha256_hex(K9S_BYTES));
            assert_eq!(actual, sha256_hex(b"tampered"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.requests_to(&k9s_checksums("0.50.16")), 0);
    assert!(!request.destination.exists());
    assert!(!partial_path(&request.destination).exists());
}

#[test]
fn test_published_digest_when_not_pinned() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!(
            "{}  k9s_Linux_arm64.tar.gz\n{}  k9s_Linux_amd64.tar.gz\n",
            sha256_hex(b"arm"),
            sha256_hex(K9S_BYTES)
        ),
    );
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::require_verified());
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();

    assert_eq!(outcome.tier, TrustTier::Published);
    assert_eq!(outcome.digest_source, k9s_checksums("0.50.16"));
    assert_eq!(
        attempt_results(&outcome),
        vec![
            (TrustTier::Signature, AttemptResult::NotApplicable),
            (TrustTier::Pinned, AttemptResult::NotApplicable),
            (TrustTier::Published, AttemptResult::Accepted),
        ]
    );
}

#[test]
fn test_publisher_mismatch_is_fatal() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!("{}  k9s_Linux_amd64.tar.gz\n", sha256_hex(b"something else")),
    );
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = k9s_request(&dir);

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let err = verifier.verify_download(&mut session(&mock), &request).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DigestMismatch);
    assert_eq!(err.tier(), Some(TrustTier::Published));
    assert!(!request.destination.exists());
}

#[test]
fn test_tofu_carries_warning() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&python_artifact("3.12.7"), b"cpython".to_vec());
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new("python", "3.12.7", Platform::Amd64, dir.path().join("Python.tar.xz"));

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let outcome = verifier.verify_download(&mut session(&mock), &request).unwrap();

    assert_eq!(outcome.tier, TrustTier::Calculated);
    assert!(!outcome.digest_match);
    assert!(outcome.is_degraded());
    assert_eq!(outcome.warnings.first().map(String::as_str), Some(TOFU_WARNING));
    assert_eq!(outcome.digest, sha256_hex(b"cpython"));
    assert_eq!(outcome.attempts.len(), 4);
    assert_eq!(outcome.attempts[3].result, AttemptResult::Accepted);

    let json = outcome.to_json().unwrap();
    assert!(json.contains("\"digest_match\": false"));
    assert!(json.contains("calculated"));
}

#[test]
fn test_enforcement_refuses_tofu() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&python_artifact("3.12.7"), b"cpython".to_vec());
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new("python", "3.12.7", Platform::Amd64, dir.path().join("Python.tar.xz"));

    let verifier = Verifier::new(&registry, VerificationPolicy::require_verified());
    let err = verifier.verify_download(&mut session(&mock), &request).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientTrust);
    match err {
        VerificationError::InsufficientTrust { minimum, attempts, .. } => {
            assert_eq!(minimum, TrustTier::Published);
            let last = attempts.last().unwrap();
            assert_eq!(last.tier, TrustTier::Calculated);
            assert_eq!(last.result, AttemptResult::Skipped);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!request.destination.exists());
    assert!(!partial_path(&request.destination).exists());
}

#[test]
fn test_wrong_platform_pin_falls_through_with_warning() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!("{}  k9s_Linux_amd64.tar.gz\n", sha256_hex(K9S_BYTES)),
    );
    let db = pinned(vec![record("k9s", "0.50.16", "arm64", &sha256_hex(b"arm"), TrustTier::Published)]);
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive()).with_pinned(&db);
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();

    assert_eq!(outcome.tier, TrustTier::Published);
    assert!(outcome.warnings.iter().any(|w| w.contains("arm64")));
}

#[test]
fn test_missing_checksum_listing_falls_through() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();
    assert_eq!(outcome.tier, TrustTier::Calculated);
    assert_eq!(outcome.attempts[2].result, AttemptResult::NotApplicable);
}

#[test]
fn test_publisher_outage_degrades_to_tofu() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.fail(
        &k9s_checksums("0.50.16"),
        HttpError::Status {
            url: k9s_checksums("0.50.16"),
            status: 503,
        },
    );
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();

    assert_eq!(outcome.tier, TrustTier::Calculated);
    assert_eq!(outcome.warnings.first().map(String::as_str), Some(TOFU_WARNING));
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains(&k9s_checksums("0.50.16")) && w.contains("503")));
    assert_eq!(outcome.attempts[2].result, AttemptResult::NotApplicable);
    // Retried up to the policy's three attempts before giving up on the tier
    assert_eq!(mock.requests_to(&k9s_checksums("0.50.16")), 3);
}

#[test]
fn test_forbidden_checksum_listing_falls_through() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.fail(
        &k9s_checksums("0.50.16"),
        HttpError::Status {
            url: k9s_checksums("0.50.16"),
            status: 403,
        },
    );
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let outcome = Verifier::new(&registry, VerificationPolicy::permissive())
        .verify_download(&mut session(&mock), &k9s_request(&dir))
        .unwrap();
    assert_eq!(outcome.tier, TrustTier::Calculated);
    assert!(outcome.warnings.iter().any(|w| w.contains("403")));
    // Not retryable
    assert_eq!(mock.requests_to(&k9s_checksums("0.50.16")), 1);

    let strict = TempDir::new().unwrap();
    let err = Verifier::new(&registry, VerificationPolicy::require_verified())
        .verify_download(&mut session(&mock), &k9s_request(&strict))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientTrust);
    assert_eq!(err.kind().exit_code(), ExitCode::VerificationFailed);
    assert!(!k9s_request(&strict).destination.exists());
}

#[test]
fn test_pinned_or_better_accepts_published_digest() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!("{}  k9s_Linux_amd64.tar.gz\n", sha256_hex(K9S_BYTES)),
    );
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let policy = VerificationPolicy::with_minimum("pinned-or-better".parse().unwrap());
    let outcome = Verifier::new(&registry, policy)
        .verify_download(&mut session(&mock), &k9s_request(&dir))
        .unwrap();
    assert_eq!(outcome.tier, TrustTier::Published);
    assert!(outcome.digest_match);
}

#[test]
fn test_unreachable_signature_falls_through_to_publisher() {
    let key = SigningKey::from_bytes(&[9u8; 32]);
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    let sig_url = format!("{}.sig", k9s_artifact("0.50.16"));
    mock.fail(&sig_url, HttpError::Status { url: sig_url.clone(), status: 401 });
    mock.respond(
        &k9s_checksums("0.50.16"),
        format!("{}  k9s_Linux_amd64.tar.gz\n", sha256_hex(K9S_BYTES)),
    );

    let registry = signed_registry(&key, None);
    let dir = TempDir::new().unwrap();
    let outcome = Verifier::new(&registry, VerificationPolicy::require_verified())
        .verify_download(&mut session(&mock), &k9s_request(&dir))
        .unwrap();

    assert_eq!(outcome.tier, TrustTier::Published);
    assert!(outcome.warnings.iter().any(|w| w.contains(&sig_url)));
    assert_eq!(outcome.attempts[0].result, AttemptResult::NotApplicable);
}

#[test]
fn test_transient_download_failure_is_retried() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.fail_times(
        &k9s_artifact("0.50.16"),
        2,
        HttpError::Timeout {
            url: k9s_artifact("0.50.16"),
        },
    );
    let db = pinned(vec![record("k9s", "0.50.16", "amd64", &sha256_hex(K9S_BYTES), TrustTier::Published)]);
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();

    let verifier = Verifier::new(&registry, VerificationPolicy::permissive()).with_pinned(&db);
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();
    assert_eq!(outcome.tier, TrustTier::Pinned);
    assert_eq!(fs::read(&outcome.path).unwrap(), K9S_BYTES);
}

fn signed_registry(key: &SigningKey, fingerprint: Option<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::builtin();
    registry
        .configure(
            "k9s",
            &ToolOverride {
                mirror: None,
                signature: Some(SignatureConfig {
                    suffix: ".sig".to_string(),
                    public_key: Some(encode_verifying_key(&key.verifying_key())),
                    public_key_url: None,
                    key_fingerprint: fingerprint,
                }),
            },
        )
        .unwrap();
    registry
}

#[test]
fn test_signature_tier_accepts() {
    let key = SigningKey::from_bytes(&[9u8; 32]);
    let signature = STANDARD.encode(key.sign(K9S_BYTES).to_bytes());
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(&format!("{}.sig", k9s_artifact("0.50.16")), signature);
    // A pinned mismatch would be fatal, so tier 2 must not run.
    let db = pinned(vec![record("k9s", "0.50.16", "amd64", &sha256_hex(b"stale"), TrustTier::Published)]);

    let registry = signed_registry(&key, Some(compute_key_fingerprint(&key.verifying_key())));
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(&registry, VerificationPolicy::require_verified()).with_pinned(&db);
    let outcome = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap();

    assert_eq!(outcome.tier, TrustTier::Signature);
    assert!(outcome.digest_match);
    assert_eq!(attempt_results(&outcome), vec![(TrustTier::Signature, AttemptResult::Accepted)]);
}

#[test]
fn test_bad_signature_is_fatal() {
    let key = SigningKey::from_bytes(&[9u8; 32]);
    let signature = STANDARD.encode(key.sign(b"different bytes").to_bytes());
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(&format!("{}.sig", k9s_artifact("0.50.16")), signature);

    let registry = signed_registry(&key, None);
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let err = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DigestMismatch);
    assert_eq!(err.tier(), Some(TrustTier::Signature));
}

#[test]
fn test_fingerprint_mismatch_is_fatal() {
    let key = SigningKey::from_bytes(&[9u8; 32]);
    let signature = STANDARD.encode(key.sign(K9S_BYTES).to_bytes());
    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    mock.respond(&format!("{}.sig", k9s_artifact("0.50.16")), signature);

    let registry = signed_registry(&key, Some("00".repeat(32)));
    let dir = TempDir::new().unwrap();
    let verifier = Verifier::new(&registry, VerificationPolicy::permissive());
    let err = verifier.verify_download(&mut session(&mock), &k9s_request(&dir)).unwrap_err();
    assert!(matches!(err, VerificationError::SignatureInvalid { .. }));
}

#[test]
fn test_unknown_tool_makes_no_requests() {
    let mock = Arc::new(MockHttp::new());
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new("terraform", "1.9.0", Platform::Amd64, dir.path().join("tf.zip"));

    let err = Verifier::new(&registry, VerificationPolicy::permissive())
        .verify_download(&mut session(&mock), &request)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSpec);
    assert_eq!(mock.request_count(), 0);
}

#[test]
fn test_report_round_trips_through_file() {
    let mock = Arc::new(MockHttp::new());
    mock.respond(&python_artifact("3.12.7"), b"cpython".to_vec());
    let registry = ToolRegistry::builtin();
    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new("python", "3.12.7", Platform::Amd64, dir.path().join("Python.tar.xz"));

    let outcome = Verifier::new(&registry, VerificationPolicy::permissive())
        .verify_download(&mut session(&mock), &request)
        .unwrap();
    let report = dir.path().join("report.json");
    outcome.write_to_file(&report).unwrap();
    assert_eq!(VerificationOutcome::from_file(&report).unwrap(), outcome);
}
