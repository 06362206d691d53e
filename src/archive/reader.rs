//! Parsing the save archive and deriving the title → save directory mapping.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::archive::format::{ArchiveEntry, ArchiveHeader, ENTRY_SIZE, HEADER_SIZE};
use crate::error::{Result, ToolError};
use crate::model::title::{SaveDirId, TitleId};

/// Starting point for the highest sequential save index.
///
/// Index 1 is never handed out to a new entry even on an empty archive.
pub const MIN_SYSTEM_INDEX: u64 = 1;

/// In-memory copy of the whole archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub header: ArchiveHeader,
    /// Records in file order.
    pub entries: Vec<ArchiveEntry>,
    /// Bytes after the declared entry region, if any.
    pub trailer: Vec<u8>,
}

/// Mappings derived from an [`Archive`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveIndex {
    /// Title id → save directory id, first occurrence wins.
    pub mapping: BTreeMap<TitleId, SaveDirId>,

    /// Later occurrences of a title id (auxiliary saves such as BCAT data).
    ///
    /// Kept for inspection only; nothing consumes it when syncing.
    pub auxiliary: BTreeMap<TitleId, SaveDirId>,

    /// Highest sequential save directory index seen.
    pub max_system_index: u64,
}

impl SaveIndex {
    /// Save directory of a title.
    pub fn get(&self, title: TitleId) -> Option<SaveDirId> {
        self.mapping.get(&title).copied()
    }

    pub fn contains(&self, title: TitleId) -> bool {
        self.mapping.contains_key(&title)
    }
}

impl Archive {
    /// Serialize back to the on-disk layout.
    ///
    /// The header count is taken from the number of entries held.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(HEADER_SIZE + self.entries.len() * ENTRY_SIZE + self.trailer.len());
        let header = ArchiveHeader {
            reserved: self.header.reserved,
            entry_count: self.entries.len() as u32,
        };
        // Writes into a Vec cannot fail.
        let _ = header.write_to(&mut out);
        for entry in &self.entries {
            let _ = entry.write_to(&mut out);
        }
        out.extend_from_slice(&self.trailer);
        out
    }

    /// Derive the title mapping, auxiliary entries and maximum index.
    pub fn save_index(&self) -> SaveIndex {
        let mut index = SaveIndex {
            max_system_index: MIN_SYSTEM_INDEX,
            ..SaveIndex::default()
        };

        for entry in &self.entries {
            let title = entry.title_id();
            let save_dir = entry.save_dir_id();

            if let Some(n) = save_dir.sequential_index() {
                index.max_system_index = index.max_system_index.max(n);
            }

            if title.is_system() {
                continue;
            }
            if index.mapping.contains_key(&title) {
                index.auxiliary.insert(title, save_dir);
            } else {
                index.mapping.insert(title, save_dir);
            }
        }
        index
    }
}

/// Reads archives from disk or from memory.
pub struct ArchiveReader;

impl ArchiveReader {
    /// Read and parse the archive at `path`.
    ///
    /// A missing file is a [`ToolError::MissingPrerequisite`].
    pub fn read(path: &Path) -> Result<Archive> {
        let bytes = std::fs::read(path).map_err(|e| ToolError::open(path, e))?;
        let archive = Self::parse(&bytes, path)?;
        debug!(
            path = %path.display(),
            entries = archive.entries.len(),
            "Read save archive"
        );
        Ok(archive)
    }

    /// Parse archive bytes. `path` is only used in error messages.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Archive> {
        let header = ArchiveHeader::parse(bytes).ok_or_else(|| {
            ToolError::corrupt(
                path,
                format!("file is {} bytes, shorter than the header", bytes.len()),
            )
        })?;

        let count = header.entry_count as usize;
        let region_end = count
            .checked_mul(ENTRY_SIZE)
            .and_then(|len| len.checked_add(HEADER_SIZE))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                ToolError::corrupt(
                    path,
                    format!(
                        "header declares {count} entries but only {} bytes follow it",
                        bytes.len() - HEADER_SIZE
                    ),
                )
            })?;

        let mut entries = Vec::with_capacity(count);
        for (i, chunk) in bytes[HEADER_SIZE..region_end]
            .chunks(ENTRY_SIZE)
            .enumerate()
        {
            let entry = ArchiveEntry::parse(chunk).ok_or_else(|| {
                ToolError::corrupt(path, format!("entry {i} is truncated"))
            })?;
            if !entry.has_standard_tag() {
                warn!(
                    path = %path.display(),
                    entry = i,
                    "Entry has an unexpected type tag; keeping it unchanged"
                );
            }
            entries.push(entry);
        }

        let trailer = bytes[region_end..].to_vec();
        if !trailer.is_empty() {
            debug!(bytes = trailer.len(), "Archive has trailing bytes after entries");
        }

        Ok(Archive {
            header,
            entries,
            trailer,
        })
    }
}
