//! Pinned checksum database tests
//!
//! The on-disk document, the update protocol and how a loaded database feeds
//! tier 2 of verification.

mod fixtures;

use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use toolpin::http::MockHttp;
use toolpin::verify::AttemptResult;
use toolpin::{
    DownloadRequest, ErrorKind, HashAlgorithm, PinnedStore, Platform, ToolRegistry, TrustTier, VerificationPolicy,
    Verifier,
};

use fixtures::{k9s_artifact, record, session, sha256_hex};

const K9S_BYTES: &[u8] = b"k9s release asset";

fn document(digest: &str) -> String {
    format!(
        r#"{{
  "metadata": {{ "schema_version": 1, "generated": "2026-01-01T00:00:00Z" }},
  "checksums": [
    {{ "tool": "k9s", "version": "0.50.16", "platform": "amd64",
      "algorithm": "sha256", "digest": "{}",
      "captured_tier": "published", "captured_at": "2026-01-01T00:00:00Z" }}
  ]
}}"#,
        digest
    )
}

#[test]
fn test_hand_written_document_drives_tier_two() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checksums.json");
    fs::write(&path, document(&sha256_hex(K9S_BYTES))).unwrap();

    let db = PinnedStore::new(&path).load().unwrap();
    let pin = db.get("k9s", "0.50.16", "amd64").unwrap();
    assert_eq!(pin.algorithm, HashAlgorithm::Sha256);
    assert_eq!(pin.captured_tier, TrustTier::Published);

    let mock = Arc::new(MockHttp::new());
    mock.respond(&k9s_artifact("0.50.16"), K9S_BYTES);
    let registry = ToolRegistry::builtin();
    let request = DownloadRequest::new("k9s", "0.50.16", Platform::Amd64, dir.path().join("out/k9s.tar.gz"));

    let outcome = Verifier::new(&registry, VerificationPolicy::require_verified())
        .with_pinned(&db)
        .verify_download(&mut session(&mock), &request)
        .unwrap();
    assert_eq!(outcome.tier, TrustTier::Pinned);
    assert_eq!(outcome.attempts[1].result, AttemptResult::Accepted);
    assert_eq!(outcome.pinned_db_fingerprint, Some(db.fingerprint().unwrap()));
}

#[test]
fn test_malformed_document_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checksums.json");

    fs::write(&path, document("not-hex")).unwrap();
    let err = PinnedStore::new(&path).load().unwrap_err();
    assert!(err.is_corrupt());

    // Digests are stored lowercase
    fs::write(&path, document(&sha256_hex(K9S_BYTES).to_uppercase())).unwrap();
    let err = PinnedStore::new(&path).load().unwrap_err();
    assert!(err.is_corrupt());

    fs::write(&path, "{ truncated").unwrap();
    let err = PinnedStore::new(&path).load().unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn test_failed_update_leaves_file_byte_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checksums.json");
    fs::write(&path, document(&sha256_hex(K9S_BYTES))).unwrap();
    let before = fs::read(&path).unwrap();

    let store = PinnedStore::new(&path);
    let err = store
        .update_at(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(), |db| {
            db.upsert(record("kubectl", "1.33.3", "amd64", "zz", TrustTier::Published));
        })
        .unwrap_err();
    assert!(err.is_corrupt());
    assert_eq!(fs::read(&path).unwrap(), before);

    // A timestamp that does not move forward is refused too
    let err = store
        .update_at(Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap(), |db| {
            db.upsert(record("kubectl", "1.33.3", "amd64", &sha256_hex(b"kubectl"), TrustTier::Published));
        })
        .unwrap_err();
    assert!(err.is_corrupt());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_successful_update_keeps_backup_of_previous() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checksums.json");
    fs::write(&path, document(&sha256_hex(K9S_BYTES))).unwrap();
    let before = fs::read(&path).unwrap();

    let store = PinnedStore::new(&path).with_backup_dir(dir.path().join("backups"));
    let summary = store
        .update(|db| {
            db.upsert(record("kubectl", "1.33.3", "amd64", &sha256_hex(b"kubectl"), TrustTier::Published));
        })
        .unwrap();

    assert_eq!(summary.records, 2);
    let backup = summary.backup.unwrap();
    assert_eq!(fs::read(&backup).unwrap(), before);

    let reloaded = store.load().unwrap();
    assert!(reloaded.get("kubectl", "1.33.3", "amd64").is_some());
    assert!(reloaded.metadata.generated > Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
}

#[test]
fn test_prune_records_and_backups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checksums.json");
    let store = PinnedStore::new(&path)
        .with_backup_dir(dir.path().join("backups"))
        .with_backup_retention(2);
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    for (i, version) in ["0.50.14", "0.50.15", "0.50.16"].iter().enumerate() {
        store
            .update_at(start + Duration::minutes(i as i64), |db| {
                db.upsert(record("k9s", version, "amd64", &sha256_hex(version.as_bytes()), TrustTier::Published));
            })
            .unwrap();
    }
    store
        .update_at(start + Duration::minutes(10), |db| {
            db.upsert(record("node", "22.18.0", "amd64", &sha256_hex(b"node"), TrustTier::Published));
        })
        .unwrap();

    let mut removed = 0;
    store
        .update_at(start + Duration::minutes(20), |db| removed = db.remove("k9s", Some("0.50.14")))
        .unwrap();
    assert_eq!(removed, 1);

    let db = store.load().unwrap();
    assert!(db.get("k9s", "0.50.14", "amd64").is_none());
    assert!(db.get("k9s", "0.50.16", "amd64").is_some());
    assert_eq!(store.backups().unwrap().len(), 2);
}

#[test]
fn test_store_error_kinds() {
    let dir = TempDir::new().unwrap();
    let store = PinnedStore::new(dir.path().join("missing.json"));
    assert!(store.load_or_empty().unwrap().checksums.is_empty());

    fs::write(store.path(), "[]").unwrap();
    let err = store.load().unwrap_err();
    assert!(err.is_corrupt());
    assert_eq!(
        toolpin::agent::AgentError::from(err).kind(),
        ErrorKind::StoreCorrupt
    );
}
