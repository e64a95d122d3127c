//! Publisher digest documents (tier 3)

use regex_lite::Regex;
use std::sync::OnceLock;
use toolpin_store::HashAlgorithm;

use crate::feed::GoRelease;
use crate::registry::DigestSource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishedDigestError {
    #[error("{file} is not listed in {url}")]
    NotListed { file: String, url: String },

    #[error("{url} is malformed: {reason}")]
    Malformed { url: String, reason: String },
}

fn gnu_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9a-fA-F]{64}|[0-9a-fA-F]{128})\s+[ *]?(\S.*?)\s*$").expect("valid regex")
    })
}

fn bsd_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:SHA256|SHA512|SHA2-256|SHA2-512)\s*\((.+)\)\s*=\s*([0-9a-fA-F]+)\s*$")
            .expect("valid regex")
    })
}

fn name_matches(listed: &str, file_name: &str) -> bool {
    let listed = listed.trim_start_matches("./");
    listed == file_name || listed.rsplit('/').next() == Some(file_name)
}

/// Find `file_name` in a `sha256sum`/`shasum` listing (GNU or BSD style).
pub fn find_in_checksum_list(text: &str, file_name: &str, algorithm: HashAlgorithm) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        let (digest, name) = if let Some(caps) = gnu_line().captures(line) {
            (caps.get(1)?.as_str(), caps.get(2)?.as_str())
        } else if let Some(caps) = bsd_line().captures(line) {
            (caps.get(2)?.as_str(), caps.get(1)?.as_str())
        } else {
            continue;
        };

        if name_matches(name, file_name) {
            let digest = digest.to_ascii_lowercase();
            if algorithm.is_valid_digest(&digest) {
                return Some(digest);
            }
        }
    }
    None
}

/// First token of the first non-empty line.
pub fn parse_single_digest(text: &str, algorithm: HashAlgorithm) -> Option<String> {
    let token = text.lines().map(str::trim).find(|l| !l.is_empty())?.split_whitespace().next()?;
    let digest = token.to_ascii_lowercase();
    algorithm.is_valid_digest(&digest).then_some(digest)
}

/// Pull the expected digest for `source` out of a fetched document.
pub fn extract_published_digest(source: &DigestSource, body: &[u8]) -> Result<String, PublishedDigestError> {
    let url = source.url().to_string();
    match source {
        DigestSource::ChecksumList {
            file_name,
            algorithm,
            ..
        } => {
            let text = String::from_utf8_lossy(body);
            find_in_checksum_list(&text, file_name, *algorithm).ok_or_else(|| {
                PublishedDigestError::NotListed {
                    file: file_name.clone(),
                    url,
                }
            })
        }
        DigestSource::SingleDigest { algorithm, .. } => {
            let text = String::from_utf8_lossy(body);
            parse_single_digest(&text, *algorithm).ok_or_else(|| PublishedDigestError::Malformed {
                url,
                reason: format!("no {} digest found", algorithm),
            })
        }
        DigestSource::GoIndex { file_name, .. } => {
            let releases = GoRelease::parse_index(body).map_err(|e| PublishedDigestError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            releases
                .iter()
                .find_map(|r| r.file(file_name))
                .map(|f| f.sha256.to_ascii_lowercase())
                .filter(|d| HashAlgorithm::Sha256.is_valid_digest(d))
                .ok_or_else(|| PublishedDigestError::NotListed {
                    file: file_name.clone(),
                    url,
                })
        }
    }
}
