//! Adding entries for titles the archive does not know yet.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::archive::backup::BackupRotation;
use crate::archive::format::ArchiveEntry;
use crate::archive::reader::{ArchiveReader, SaveIndex};
use crate::archive::writer;
use crate::error::{Result, ToolError};
use crate::model::title::{SaveDirId, TitleId};

/// An entry that will be (or was) added to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedEntry {
    pub title_id: TitleId,
    pub save_dir_id: SaveDirId,
}

/// Result of [`ArchiveAppender::append`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppendOutcome {
    /// Entries written, in file order.
    pub added: Vec<PlannedEntry>,
    /// Backup taken before writing (none when nothing was added).
    pub backup: Option<PathBuf>,
    /// Old backups deleted by retention.
    pub pruned: Vec<PathBuf>,
}

/// Appends synthesized entries to an existing archive.
#[derive(Debug, Clone)]
pub struct ArchiveAppender {
    path: PathBuf,
    backups: BackupRotation,
}

impl ArchiveAppender {
    pub fn new(path: impl Into<PathBuf>, retention: usize) -> Self {
        let path = path.into();
        let backups = BackupRotation::for_archive(&path, retention);
        Self { path, backups }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupRotation {
        &self.backups
    }

    /// Entries that appending `candidates` to an archive with `index` would add.
    ///
    /// Titles already mapped, repeated candidates and the system id are
    /// skipped. Indices continue from the archive's highest one.
    pub fn plan(index: &SaveIndex, candidates: &[TitleId]) -> Vec<PlannedEntry> {
        let mut seen = HashSet::new();
        let mut next = index.max_system_index;
        candidates
            .iter()
            .copied()
            .filter(|id| !id.is_system() && !index.contains(*id) && seen.insert(*id))
            .map(|title_id| {
                next += 1;
                PlannedEntry {
                    title_id,
                    save_dir_id: SaveDirId::new(next),
                }
            })
            .collect()
    }

    /// Add an entry for every candidate missing from the archive.
    ///
    /// The archive must already exist. It is backed up before being replaced,
    /// and old backups are pruned afterwards.
    pub fn append(&mut self, candidates: &[TitleId]) -> Result<AppendOutcome> {
        if !self.path.is_file() {
            return Err(ToolError::MissingPrerequisite(self.path.clone()));
        }

        let mut archive = ArchiveReader::read(&self.path)?;
        let planned = Self::plan(&archive.save_index(), candidates);
        if planned.is_empty() {
            debug!(path = %self.path.display(), "No archive entries to add");
            return Ok(AppendOutcome::default());
        }

        let backup = self.backups.create(&self.path)?;

        archive.entries.extend(
            planned
                .iter()
                .map(|p| ArchiveEntry::synthesize(p.title_id, p.save_dir_id.raw())),
        );
        writer::replace_archive(&self.path, &archive)?;
        for p in &planned {
            info!(title = %p.title_id, save_dir = %p.save_dir_id, "Added archive entry");
        }

        let pruned = self.backups.prune_or_warn();
        Ok(AppendOutcome {
            added: planned,
            backup: Some(backup),
            pruned,
        })
    }
}
