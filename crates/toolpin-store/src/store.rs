//! File-backed pinned database with the backup → validate → replace protocol.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::PinnedDatabase;
use crate::error::{StoreError, StoreResult};

/// Number of backups kept by default
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

/// Outcome of a successful update
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    /// Backup of the previous live document, if there was one
    pub backup: Option<PathBuf>,

    pub previous_generated: Option<DateTime<Utc>>,

    pub generated: DateTime<Utc>,

    /// Number of records in the new document
    pub records: usize,

    /// Backups removed by retention pruning
    pub pruned_backups: usize,
}

/// Handle on the live pinned database file.
#[derive(Debug, Clone)]
pub struct PinnedStore {
    path: PathBuf,
    backup_dir: PathBuf,
    backup_retention: usize,
}

impl PinnedStore {
    /// Open a store at `path`. Backups go to `.toolpin-backups/` next to it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_dir = path
            .parent()
            .map(|p| p.join(".toolpin-backups"))
            .unwrap_or_else(|| PathBuf::from(".toolpin-backups"));
        Self {
            path,
            backup_dir,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_backup_retention(mut self, keep: usize) -> Self {
        self.backup_retention = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate the live document.
    pub fn load(&self) -> StoreResult<PinnedDatabase> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }
        let json = fs::read_to_string(&self.path)?;
        let db = PinnedDatabase::from_json(&json)?;
        db.validate().map_err(StoreError::Invalid)?;
        Ok(db)
    }

    /// Load the live document, or an empty one when the file does not exist
    /// yet. A present-but-broken file is still an error.
    pub fn load_or_empty(&self) -> StoreResult<PinnedDatabase> {
        match self.load() {
            Err(StoreError::NotFound(_)) => Ok(PinnedDatabase::empty()),
            other => other,
        }
    }

    /// Apply `change` to a copy of the live document and swap it in.
    pub fn update<F>(&self, change: F) -> StoreResult<UpdateSummary>
    where
        F: FnOnce(&mut PinnedDatabase),
    {
        self.update_at(Utc::now(), change)
    }

    /// Like [`update`](Self::update) with an explicit `generated` timestamp.
    ///
    /// The live file is only ever touched by the final rename. If the live
    /// document is unreadable, or the candidate fails validation, nothing but
    /// the backup directory is written.
    pub fn update_at<F>(&self, now: DateTime<Utc>, change: F) -> StoreResult<UpdateSummary>
    where
        F: FnOnce(&mut PinnedDatabase),
    {
        let previous = if self.path.exists() {
            Some(self.load()?)
        } else {
            None
        };

        let backup = match previous {
            Some(_) => Some(self.write_backup(now)?),
            None => None,
        };

        let mut next = previous.clone().unwrap_or_else(PinnedDatabase::empty);
        change(&mut next);
        next.metadata.schema_version = crate::SCHEMA_VERSION;
        next.metadata.generated = now;

        next.validate_against(previous.as_ref())
            .map_err(StoreError::Invalid)?;

        self.replace(&next)?;
        let pruned_backups = self.prune_backups()?;

        Ok(UpdateSummary {
            backup,
            previous_generated: previous.map(|p| p.metadata.generated),
            generated: next.metadata.generated,
            records: next.checksums.len(),
            pruned_backups,
        })
    }

    /// Write-then-rename over the live path.
    fn replace(&self, db: &PinnedDatabase) -> StoreResult<()> {
        let json = db.to_json()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn write_backup(&self, now: DateTime<Utc>) -> StoreResult<PathBuf> {
        fs::create_dir_all(&self.backup_dir)?;
        let name = format!(
            "{}-{}.json",
            self.file_stem(),
            now.format("%Y%m%dT%H%M%S%.6fZ")
        );
        let backup = self.backup_dir.join(name);
        fs::copy(&self.path, &backup)?;
        Ok(backup)
    }

    fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "checksums".to_string())
    }

    /// Backups of this store, oldest first.
    pub fn backups(&self) -> StoreResult<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-", self.file_stem());
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
            })
            .collect();
        // Timestamps are zero-padded, so name order is chronological.
        backups.sort();
        Ok(backups)
    }

    /// Delete the oldest backups beyond the retention count.
    pub fn prune_backups(&self) -> StoreResult<usize> {
        let backups = self.backups()?;
        let excess = backups.len().saturating_sub(self.backup_retention);
        for path in &backups[..excess] {
            fs::remove_file(path)?;
        }
        Ok(excess)
    }
}
