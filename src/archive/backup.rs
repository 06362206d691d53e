//! Timestamped archive backups with bounded retention.
//!
//! Backups live next to the archive as `<stem>-<unix-millis>.bk`
//! (e.g. `imkvdb-1700000000000.bk`). The timestamp defines recency.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, ToolError};

/// Default number of archive backups kept.
pub const DEFAULT_RETENTION: usize = 5;

/// Extension of archive backup files.
const BACKUP_EXT: &str = "bk";

/// Creates and prunes backups of one archive file.
#[derive(Debug, Clone)]
pub struct BackupRotation {
    dir: PathBuf,
    stem: String,
    retention: usize,
}

impl BackupRotation {
    /// Rotation for the archive at `archive_path`, keeping `retention` copies.
    pub fn for_archive(archive_path: &Path, retention: usize) -> Self {
        let dir = archive_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = archive_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        Self {
            dir,
            stem,
            retention: retention.max(1),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Copy `source` to a new backup and return its path.
    ///
    /// The timestamp is bumped past the newest existing backup so that
    /// names stay strictly increasing even within one millisecond.
    pub fn create(&self, source: &Path) -> Result<PathBuf> {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let stamp = match self.list()?.last() {
            Some((newest, _)) if *newest >= now => newest + 1,
            _ => now,
        };

        let target = self.path_for(stamp);
        std::fs::copy(source, &target).map_err(|e| ToolError::io(&target, e))?;
        info!(backup = %target.display(), "Backed up save archive");
        Ok(target)
    }

    /// Existing backups, oldest first.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ToolError::io(&self.dir, e)),
        };

        let mut backups = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| ToolError::io(&self.dir, e))?;
            let name = entry.file_name();
            if let Some(stamp) = self.parse_stamp(&name.to_string_lossy()) {
                backups.push((stamp, entry.path()));
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Delete the oldest backups beyond the retention limit.
    ///
    /// Returns the removed paths.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let backups = self.list()?;
        let excess = backups.len().saturating_sub(self.retention);
        let mut removed = Vec::with_capacity(excess);
        for (_, path) in backups.into_iter().take(excess) {
            std::fs::remove_file(&path).map_err(|e| ToolError::io(&path, e))?;
            debug!(backup = %path.display(), "Pruned old archive backup");
            removed.push(path);
        }
        Ok(removed)
    }

    /// Like [`prune`](Self::prune), but a failure is logged and yields no removals.
    ///
    /// Used after the archive has already been replaced.
    pub fn prune_or_warn(&self) -> Vec<PathBuf> {
        match self.prune() {
            Ok(removed) => removed,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Could not prune old archive backups");
                Vec::new()
            }
        }
    }

    fn path_for(&self, stamp: u64) -> PathBuf {
        self.dir
            .join(format!("{}-{stamp}.{BACKUP_EXT}", self.stem))
    }

    fn parse_stamp(&self, file_name: &str) -> Option<u64> {
        let rest = file_name.strip_prefix(&self.stem)?.strip_prefix('-')?;
        let digits = rest.strip_suffix(BACKUP_EXT)?.strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stamp() {
        let rotation = BackupRotation::for_archive(Path::new("/x/imkvdb.arc"), 5);
        assert_eq!(rotation.parse_stamp("imkvdb-1700000000000.bk"), Some(1_700_000_000_000));
        assert_eq!(rotation.parse_stamp("imkvdb-.bk"), None);
        assert_eq!(rotation.parse_stamp("imkvdb-12a.bk"), None);
        assert_eq!(rotation.parse_stamp("imkvdb.arc"), None);
        assert_eq!(rotation.parse_stamp("other-1700000000000.bk"), None);
    }

    #[test]
    fn test_create_and_prune_keeps_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("imkvdb.arc");
        std::fs::write(&archive, b"data").unwrap();
        let rotation = BackupRotation::for_archive(&archive, 3);

        let mut created = Vec::new();
        for _ in 0..5 {
            created.push(rotation.create(&archive).unwrap());
        }
        let removed = rotation.prune().unwrap();
        assert_eq!(removed, created[..2].to_vec());

        let remaining: Vec<PathBuf> = rotation.list().unwrap().into_iter().map(|(_, p)| p).collect();
        assert_eq!(remaining, created[2..].to_vec());
        assert_eq!(std::fs::read(&remaining[0]).unwrap(), b"data");
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("imkvdb.arc");
        std::fs::write(&archive, b"x").unwrap();
        let rotation = BackupRotation::for_archive(&archive, 5);
        rotation.create(&archive).unwrap();
        rotation.create(&archive).unwrap();
        let stamps: Vec<u64> = rotation.list().unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[0] < stamps[1]);
    }
}
