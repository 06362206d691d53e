//! Canonical ordering of archive entries.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::archive::backup::BackupRotation;
use crate::archive::format::ArchiveEntry;
use crate::archive::reader::ArchiveReader;
use crate::archive::writer;
use crate::error::Result;

/// Result of [`ArchiveSorter::sort_file`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SortOutcome {
    /// The file was rewritten in a new order.
    pub sorted: bool,
    /// Backup taken before rewriting.
    pub backup: Option<PathBuf>,
    /// Old backups deleted by retention.
    pub pruned: Vec<PathBuf>,
}

/// Reorders entries by title id, then by the key tie-break byte.
pub struct ArchiveSorter;

impl ArchiveSorter {
    /// Total order over entries.
    ///
    /// Ascending numeric title id; equal ids are ordered by the tie-break
    /// byte, then by the raw key and value bytes.
    pub fn compare(a: &ArchiveEntry, b: &ArchiveEntry) -> Ordering {
        a.title_id()
            .cmp(&b.title_id())
            .then_with(|| a.tie_break().cmp(&b.tie_break()))
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.value.cmp(&b.value))
            .then_with(|| a.tag.cmp(&b.tag))
    }

    pub fn sort_entries(entries: &mut [ArchiveEntry]) {
        entries.sort_by(Self::compare);
    }

    pub fn is_sorted(entries: &[ArchiveEntry]) -> bool {
        entries
            .windows(2)
            .all(|w| Self::compare(&w[0], &w[1]) != Ordering::Greater)
    }

    /// Sort the archive at `path` in place (atomically).
    ///
    /// Only record positions change: header, trailer and record bytes are
    /// kept. An archive already in order is left untouched; otherwise it is
    /// backed up through `backups` before being replaced.
    pub fn sort_file(path: &Path, backups: &BackupRotation) -> Result<SortOutcome> {
        let mut archive = ArchiveReader::read(path)?;
        if Self::is_sorted(&archive.entries) {
            debug!(path = %path.display(), "Archive already sorted");
            return Ok(SortOutcome::default());
        }

        let backup = backups.create(path)?;
        Self::sort_entries(&mut archive.entries);
        writer::replace_archive(path, &archive)?;
        info!(path = %path.display(), entries = archive.entries.len(), "Sorted save archive");

        Ok(SortOutcome {
            sorted: true,
            backup: Some(backup),
            pruned: backups.prune_or_warn(),
        })
    }
}
