//! Binary layout of the save-data archive (`imkvdb.arc`).
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ HEADER (12 bytes)                    │
//! │  reserved: [u8; 8] (kept verbatim)   │
//! │  entry_count: u32 little-endian      │
//! ├──────────────────────────────────────┤
//! │ ENTRIES (140 bytes each)             │
//! │  tag:   [u8; 12] = "IMEN" 40 00 ..   │
//! │  key:   [u8; 64] title id LE at 0    │
//! │  value: [u8; 64] save dir id LE at 0 │
//! ├──────────────────────────────────────┤
//! │ TRAILER (optional, kept verbatim)    │
//! └──────────────────────────────────────┘
//! ```

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::model::title::{SaveDirId, TitleId};

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 12;

/// Offset of the entry count inside the header.
pub const COUNT_OFFSET: usize = 8;

/// Size of one entry record.
pub const ENTRY_SIZE: usize = TAG_SIZE + BLOB_SIZE * 2;

/// Size of the per-entry type tag.
pub const TAG_SIZE: usize = 12;

/// Size of the key and value blobs.
pub const BLOB_SIZE: usize = 64;

/// Type tag that prefixes every entry.
pub const ENTRY_TAG: [u8; TAG_SIZE] = [
    0x49, 0x4D, 0x45, 0x4E, 0x40, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00,
];

/// Key-blob byte used to order entries that share a title id.
pub const TIE_BREAK_OFFSET: usize = 32;

/// Key-blob bytes set to `1` in a synthesized entry.
const KEY_TEMPLATE_ONES: [usize; 2] = [8, TIE_BREAK_OFFSET];

/// Value-blob byte set to `1` in a synthesized entry (user save space).
const VALUE_SPACE_OFFSET: usize = 24;

/// The 12-byte archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Leading bytes not interpreted by this tool.
    pub reserved: [u8; COUNT_OFFSET],
    /// Number of entry records that follow.
    pub entry_count: u32,
}

impl ArchiveHeader {
    /// Decode a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` when fewer bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_SIZE)?;
        let mut reserved = [0u8; COUNT_OFFSET];
        reserved.copy_from_slice(&header[..COUNT_OFFSET]);
        Some(Self {
            reserved,
            entry_count: LittleEndian::read_u32(&header[COUNT_OFFSET..]),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.reserved)?;
        w.write_u32::<LittleEndian>(self.entry_count)
    }
}

/// One 140-byte archive record.
///
/// All bytes are kept so that existing entries are written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub tag: [u8; TAG_SIZE],
    pub key: [u8; BLOB_SIZE],
    pub value: [u8; BLOB_SIZE],
}

impl ArchiveEntry {
    /// Decode a record from exactly [`ENTRY_SIZE`] bytes.
    ///
    /// Returns `None` when `bytes` has the wrong length.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ENTRY_SIZE {
            return None;
        }
        let mut entry = Self {
            tag: [0; TAG_SIZE],
            key: [0; BLOB_SIZE],
            value: [0; BLOB_SIZE],
        };
        entry.tag.copy_from_slice(&bytes[..TAG_SIZE]);
        entry.key.copy_from_slice(&bytes[TAG_SIZE..TAG_SIZE + BLOB_SIZE]);
        entry.value.copy_from_slice(&bytes[TAG_SIZE + BLOB_SIZE..]);
        Some(entry)
    }

    /// Build a new record for `title_id` stored in save directory `index`.
    pub fn synthesize(title_id: TitleId, index: u64) -> Self {
        let mut key = [0u8; BLOB_SIZE];
        LittleEndian::write_u64(&mut key[..8], title_id.raw());
        for offset in KEY_TEMPLATE_ONES {
            key[offset] = 1;
        }

        let mut value = [0u8; BLOB_SIZE];
        LittleEndian::write_u64(&mut value[..8], index);
        value[VALUE_SPACE_OFFSET] = 1;

        Self {
            tag: ENTRY_TAG,
            key,
            value,
        }
    }

    pub fn title_id(&self) -> TitleId {
        TitleId::new(LittleEndian::read_u64(&self.key[..8]))
    }

    pub fn save_dir_id(&self) -> SaveDirId {
        SaveDirId::new(LittleEndian::read_u64(&self.value[..8]))
    }

    pub fn tie_break(&self) -> u8 {
        self.key[TIE_BREAK_OFFSET]
    }

    pub fn has_standard_tag(&self) -> bool {
        self.tag == ENTRY_TAG
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.tag)?;
        w.write_all(&self.key)?;
        w.write_all(&self.value)
    }
}
