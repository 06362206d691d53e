//! Which way to copy a title's saves.
//!
//! Tree A is the yuzu save tree, tree B the Ryujinx one. The decision is a
//! pure function of the priority mode and what is on disk in each tree.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Timestamp difference below which two trees count as in sync.
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// Which tree wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PriorityMode {
    /// Always copy A (yuzu) over B.
    PreferA,
    /// Always copy B (Ryujinx) over A.
    PreferB,
    /// Copy whichever tree holds the most recently modified file.
    Newest,
}

impl PriorityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreferA => "yuzu",
            Self::PreferB => "ryujinx",
            Self::Newest => "newer",
        }
    }
}

impl FromStr for PriorityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yuzu" | "a" => Ok(Self::PreferA),
            "ryujinx" | "b" => Ok(Self::PreferB),
            "newer" | "newest" => Ok(Self::Newest),
            other => Err(format!(
                "unknown priority '{other}', expected yuzu, ryujinx or newer"
            )),
        }
    }
}

impl TryFrom<String> for PriorityMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PriorityMode> for String {
    fn from(mode: PriorityMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for PriorityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two save trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Emulator owning this tree.
    pub fn emulator(self) -> &'static str {
        match self {
            Self::A => "yuzu",
            Self::B => "ryujinx",
        }
    }
}

/// Copy direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub fn source(self) -> Side {
        match self {
            Self::AToB => Side::A,
            Self::BToA => Side::B,
        }
    }

    pub fn destination(self) -> Side {
        match self {
            Self::AToB => Side::B,
            Self::BToA => Side::A,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AToB => f.write_str("A->B"),
            Self::BToA => f.write_str("B->A"),
        }
    }
}

/// Why a decision was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    #[serde(rename = "A priority")]
    PriorityA,
    #[serde(rename = "B priority")]
    PriorityB,
    #[serde(rename = "A missing")]
    AMissing,
    #[serde(rename = "B missing")]
    BMissing,
    #[serde(rename = "both empty")]
    BothEmpty,
    #[serde(rename = "A empty")]
    AEmpty,
    #[serde(rename = "B empty")]
    BEmpty,
    #[serde(rename = "A newer")]
    ANewer,
    #[serde(rename = "B newer")]
    BNewer,
    #[serde(rename = "in sync")]
    InSync,
}

impl Reason {
    /// Stable tag for reports and tests.
    pub fn tag(self) -> &'static str {
        match self {
            Self::PriorityA => "A priority",
            Self::PriorityB => "B priority",
            Self::AMissing => "A missing",
            Self::BMissing => "B missing",
            Self::BothEmpty => "both empty",
            Self::AEmpty => "A empty",
            Self::BEmpty => "B empty",
            Self::ANewer => "A newer",
            Self::BNewer => "B newer",
            Self::InSync => "in sync",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of [`decide`]: a direction, or `None` for no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub direction: Option<Direction>,
    pub reason: Reason,
}

impl Decision {
    fn copy(direction: Direction, reason: Reason) -> Self {
        Self {
            direction: Some(direction),
            reason,
        }
    }

    fn skip(reason: Reason) -> Self {
        Self {
            direction: None,
            reason,
        }
    }
}

/// What a scan found in one save tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeState {
    pub exists: bool,
    /// Regular files anywhere below the root.
    pub file_count: usize,
    /// Modification time of the most recently modified file.
    pub newest: Option<SystemTime>,
}

impl TreeState {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            exists: true,
            ..Self::default()
        }
    }

    pub fn with_newest(file_count: usize, newest: SystemTime) -> Self {
        Self {
            exists: true,
            file_count,
            newest: Some(newest),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// Decide the copy direction for one title. First matching rule wins.
pub fn decide(mode: PriorityMode, a: &TreeState, b: &TreeState) -> Decision {
    use Direction::{AToB, BToA};

    match mode {
        PriorityMode::PreferA => return Decision::copy(AToB, Reason::PriorityA),
        PriorityMode::PreferB => return Decision::copy(BToA, Reason::PriorityB),
        PriorityMode::Newest => {}
    }

    if !a.exists {
        return Decision::copy(BToA, Reason::AMissing);
    }
    if !b.exists {
        return Decision::copy(AToB, Reason::BMissing);
    }
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Decision::skip(Reason::BothEmpty),
        (false, true) => return Decision::copy(AToB, Reason::BEmpty),
        (true, false) => return Decision::copy(BToA, Reason::AEmpty),
        (false, false) => {}
    }

    let (Some(a_newest), Some(b_newest)) = (a.newest, b.newest) else {
        return Decision::skip(Reason::InSync);
    };
    if exceeds_tolerance(a_newest, b_newest) {
        Decision::copy(AToB, Reason::ANewer)
    } else if exceeds_tolerance(b_newest, a_newest) {
        Decision::copy(BToA, Reason::BNewer)
    } else {
        Decision::skip(Reason::InSync)
    }
}

/// Whether `later` is more than [`MTIME_TOLERANCE`] after `earlier`.
fn exceeds_tolerance(later: SystemTime, earlier: SystemTime) -> bool {
    later
        .duration_since(earlier)
        .is_ok_and(|delta| delta > MTIME_TOLERANCE)
}
