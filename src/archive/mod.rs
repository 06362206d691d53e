//! The emulator's save-data archive: reading, appending, sorting, backups.

pub mod appender;
pub mod backup;
pub mod format;
pub mod reader;
pub mod sorter;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::archive::appender::{AppendOutcome, ArchiveAppender};
use crate::archive::reader::{Archive, ArchiveReader};
use crate::archive::sorter::{ArchiveSorter, SortOutcome};
use crate::error::Result;
use crate::model::title::TitleId;

/// Exclusive handle on one archive file.
///
/// Mutations take `&mut self`, so each read-modify-write cycle finishes
/// before the next one can start.
#[derive(Debug)]
pub struct SaveArchive {
    appender: ArchiveAppender,
}

impl SaveArchive {
    pub fn new(path: impl Into<PathBuf>, backup_retention: usize) -> Self {
        Self {
            appender: ArchiveAppender::new(path, backup_retention),
        }
    }

    pub fn path(&self) -> &Path {
        self.appender.path()
    }

    pub fn read(&self) -> Result<Archive> {
        ArchiveReader::read(self.path())
    }

    pub fn append(&mut self, candidates: &[TitleId]) -> Result<AppendOutcome> {
        self.appender.append(candidates)
    }

    /// Sort the archive, backing it up first when it has to be rewritten.
    pub fn sort(&mut self) -> Result<SortOutcome> {
        ArchiveSorter::sort_file(self.path(), self.appender.backups())
    }
}
