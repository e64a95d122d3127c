//! Tiered artifact verification
//!
//! Tiers are evaluated strongest first and the first one that vouches for the
//! downloaded bytes wins:
//!
//! 1. publisher signature over the artifact
//! 2. digest from the pinned database
//! 3. digest published by the upstream project
//! 4. digest calculated locally (trust on first use)
//!
//! A tier that has no reference for the artifact is skipped. A tier whose
//! reference contradicts the artifact ends verification; weaker tiers are
//! never consulted after a contradiction.

mod digest;
mod executor;
mod published;
mod report;
mod signature;
mod tier;

pub use digest::{ArtifactDigests, DigestWriter};
pub use executor::{partial_path, DownloadRequest, VerificationError, Verifier, VerifyResult};
pub use published::{
    extract_published_digest, find_in_checksum_list, parse_single_digest, PublishedDigestError,
};
pub use report::{OutcomeParts, VerificationOutcome, REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION, TOFU_WARNING};
pub use signature::{
    compute_key_fingerprint, encode_verifying_key, parse_public_key, parse_signature, verify_detached,
    DetachedSignature, PublicKey, SigningError, SigningResult, SIGNATURE_ALGORITHM,
};
pub use tier::{decide, AttemptResult, TierAttempt, TierDecision, TierProbe, VerificationPolicy};
