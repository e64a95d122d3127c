//! Shared helpers for the integration suites
//!
//! Every suite runs against [`MockHttp`]; nothing here touches the network.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use toolpin::http::MockHttp;
use toolpin::retry::{NoSleep, Retrier, RetryPolicy};
use toolpin::session::Session;
use toolpin::{ChecksumRecord, HashAlgorithm, PinnedDatabase, TrustTier};

pub const K9S_RELEASES: &str = "https://api.github.com/repos/derailed/k9s/releases?per_page=100";
pub const KUBECTL_RELEASES: &str = "https://api.github.com/repos/kubernetes/kubernetes/releases?per_page=100";
pub const PYTHON_CYCLES: &str = "https://endoflife.date/api/python.json";
pub const NODE_INDEX: &str = "https://nodejs.org/dist/index.json";

pub fn k9s_artifact(version: &str) -> String {
    format!("https://github.com/derailed/k9s/releases/download/v{}/k9s_Linux_amd64.tar.gz", version)
}

pub fn k9s_checksums(version: &str) -> String {
    format!("https://github.com/derailed/k9s/releases/download/v{}/checksums.sha256", version)
}

pub fn python_artifact(version: &str) -> String {
    format!("https://www.python.org/ftp/python/{0}/Python-{0}.tar.xz", version)
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Session over `mock` with three attempts and no sleeping.
pub fn session(mock: &Arc<MockHttp>) -> Session {
    let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)))
        .with_sleeper(NoSleep)
        .with_seed(7);
    Session::new(mock.clone(), retrier, Duration::from_secs(60))
}

/// GitHub releases payload, newest first.
pub fn github_releases(tags: &[(&str, bool)]) -> Value {
    Value::Array(
        tags.iter()
            .map(|(tag, prerelease)| {
                json!({
                    "tag_name": tag,
                    "prerelease": prerelease,
                    "draft": false,
                    "published_at": "2025-08-01T12:00:00Z",
                })
            })
            .collect(),
    )
}

/// endoflife.date cycles for the given `latest` values.
pub fn eol_cycles(latest: &[&str]) -> Value {
    Value::Array(
        latest
            .iter()
            .map(|v| {
                let cycle: Vec<&str> = v.split('.').take(2).collect();
                json!({
                    "cycle": cycle.join("."),
                    "latest": v,
                    "latestReleaseDate": "2024-10-01",
                    "lts": false,
                })
            })
            .collect(),
    )
}

pub fn record(tool: &str, version: &str, platform: &str, digest: &str, tier: TrustTier) -> ChecksumRecord {
    ChecksumRecord {
        tool: tool.to_string(),
        version: version.to_string(),
        platform: platform.to_string(),
        algorithm: HashAlgorithm::Sha256,
        digest: digest.to_string(),
        captured_tier: tier,
        captured_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn pinned(records: Vec<ChecksumRecord>) -> PinnedDatabase {
    let mut db = PinnedDatabase::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    for r in records {
        db.upsert(r);
    }
    db
}
