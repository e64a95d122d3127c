//! Pinned checksum database.
//!
//! A single JSON document mapping `(tool, version, platform)` to a digest,
//! maintained by the auto-update agent and read by every verification. The
//! file is never edited in place: [`PinnedStore::update`] backs up the live
//! document, validates the candidate copy, and swaps it in with a rename.

mod database;
mod error;
mod record;
mod store;

pub use database::{DatabaseMetadata, PinnedDatabase, StructuralError};
pub use error::{StoreError, StoreResult};
pub use record::{ChecksumKey, ChecksumRecord, HashAlgorithm, TrustTier};
pub use store::{PinnedStore, UpdateSummary, DEFAULT_BACKUP_RETENTION};

/// Schema version written into `metadata.schema_version`.
pub const SCHEMA_VERSION: u32 = 1;

/// Default file name of the pinned database.
pub const DEFAULT_FILE_NAME: &str = "checksums.json";
