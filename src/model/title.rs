//! Title and save-directory identifiers.
//!
//! Both are 8-byte values. On disk they are stored little-endian; in paths,
//! reports and logs they are rendered as 16 hexadecimal digits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Mask of the hex digit that distinguishes a patch from its application.
const PATCH_MASK: u64 = 0xF00;

/// Mask of the low digits that distinguish add-on content items.
const ADDON_MASK: u64 = 0xFFF;

/// Offset between an application id and its add-on content id range.
const ADDON_BASE: u64 = 0x1000;

/// An 8-byte title identifier (game, update, or DLC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TitleId(u64);

impl TitleId {
    /// The all-zero id used by system save entries.
    pub const SYSTEM: TitleId = TitleId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the system sentinel.
    pub fn is_system(self) -> bool {
        self.0 == 0
    }

    /// Application id of a patch: the update digit cleared.
    pub fn patch_application_id(self) -> TitleId {
        TitleId(self.0 & !PATCH_MASK)
    }

    /// Application id of an add-on content item.
    pub fn addon_application_id(self) -> TitleId {
        TitleId(self.0.wrapping_sub(ADDON_BASE) & !ADDON_MASK)
    }

    /// Upper-case rendering, as used for yuzu save directory names.
    pub fn to_upper_hex(self) -> String {
        format!("{:016X}", self.0)
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for TitleId {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex16(s)
            .map(TitleId)
            .ok_or_else(|| ToolError::InvalidTitleId(s.to_string()))
    }
}

impl From<TitleId> for String {
    fn from(id: TitleId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TitleId {
    type Error = ToolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// An 8-byte save-directory identifier.
///
/// Ids whose leading hex digit is `0` are sequential indices allocated by
/// the emulator; others (e.g. `8000000000000030`) are fixed system saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct SaveDirId(u64);

impl SaveDirId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The sequential index, if this id is one.
    pub fn sequential_index(self) -> Option<u64> {
        (self.0 >> 60 == 0).then_some(self.0)
    }
}

impl fmt::Display for SaveDirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<SaveDirId> for String {
    fn from(id: SaveDirId) -> Self {
        id.to_string()
    }
}

/// Parse exactly 16 hex digits, either case.
fn parse_hex16(s: &str) -> Option<u64> {
    if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}
