//! Where each emulator keeps its saves, its save archive and its profiles.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::model::title::{SaveDirId, TitleId};

/// Offset of the active profile id in the yuzu profile store.
pub const PROFILE_ID_OFFSET: u64 = 0x10;

/// Directory layout of one yuzu and one Ryujinx installation.
#[derive(Debug, Clone)]
pub struct EmulatorLayout {
    /// yuzu user folder.
    pub yuzu_dir: PathBuf,
    /// Ryujinx filesystem folder.
    pub ryujinx_dir: PathBuf,
}

impl EmulatorLayout {
    pub fn new(yuzu_dir: impl Into<PathBuf>, ryujinx_dir: impl Into<PathBuf>) -> Self {
        Self {
            yuzu_dir: yuzu_dir.into(),
            ryujinx_dir: ryujinx_dir.into(),
        }
    }

    /// Ryujinx save-data archive (`imkvdb.arc`).
    pub fn archive_path(&self) -> PathBuf {
        ryujinx_archive_path(&self.ryujinx_dir)
    }

    /// yuzu profile store (`profiles.dat`).
    pub fn profile_store_path(&self) -> PathBuf {
        self.yuzu_dir
            .join("nand")
            .join("system")
            .join("save")
            .join("8000000000000010")
            .join("su")
            .join("avators")
            .join("profiles.dat")
    }

    /// yuzu save root of one profile.
    pub fn yuzu_save_root(&self, profile: &str) -> PathBuf {
        self.yuzu_dir
            .join("nand")
            .join("user")
            .join("save")
            .join("0000000000000000")
            .join(profile)
    }

    /// Tree A: a title's yuzu save folder.
    pub fn yuzu_title_dir(save_root: &Path, title: TitleId) -> PathBuf {
        save_root.join(title.to_upper_hex())
    }

    /// Tree B: a title's Ryujinx save folder.
    pub fn ryujinx_title_dir(&self, save_dir: SaveDirId) -> PathBuf {
        self.ryujinx_dir
            .join("bis")
            .join("user")
            .join("save")
            .join(save_dir.to_string())
            .join("0")
    }
}

/// `imkvdb.arc` inside a Ryujinx filesystem folder.
pub fn ryujinx_archive_path(ryujinx_dir: &Path) -> PathBuf {
    ryujinx_dir
        .join("bis")
        .join("system")
        .join("save")
        .join("8000000000000000")
        .join("0")
        .join("imkvdb.arc")
}

/// Read the active profile id and render it as a save folder name.
///
/// The 16 bytes at [`PROFILE_ID_OFFSET`] are stored byte-reversed.
pub fn read_profile_id(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ToolError::open(path, e))?;
    file.seek(SeekFrom::Start(PROFILE_ID_OFFSET))
        .map_err(|e| ToolError::io(path, e))?;
    let raw = file
        .read_u128::<LittleEndian>()
        .map_err(|e| ToolError::io(path, e))?;
    let profile = format!("{raw:032X}");
    debug!(profile = %profile, "Resolved yuzu profile");
    Ok(profile)
}

/// Title ids named by the subfolders of a yuzu save root, sorted.
///
/// A missing root yields no titles. Folders that are not title ids are skipped.
pub fn list_title_dirs(save_root: &Path) -> Result<Vec<TitleId>> {
    let read_dir = match std::fs::read_dir(save_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %save_root.display(), "yuzu save folder does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(ToolError::io(save_root, e)),
    };

    let mut titles = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| ToolError::io(save_root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        match name.to_string_lossy().parse::<TitleId>() {
            Ok(id) if !id.is_system() => titles.push(id),
            _ => debug!(name = %name.to_string_lossy(), "Skipping non-title save folder"),
        }
    }
    titles.sort();
    Ok(titles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_is_byte_reversed_upper_hex() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("profiles.dat");
        let mut data = vec![0u8; 0x10];
        data.extend((1u8..=16).collect::<Vec<u8>>());
        data.extend([0xff; 8]);
        std::fs::write(&path, &data).unwrap();

        assert_eq!(read_profile_id(&path).unwrap(), "100F0E0D0C0B0A090807060504030201");
    }

    #[test]
    fn test_missing_profile_store() {
        let err = read_profile_id(Path::new("/definitely/not/here/profiles.dat")).unwrap_err();
        assert!(matches!(err, ToolError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_list_title_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("0100000000020000")).unwrap();
        std::fs::create_dir(tmp.path().join("0100000000010000")).unwrap();
        std::fs::create_dir(tmp.path().join("0000000000000000")).unwrap();
        std::fs::create_dir(tmp.path().join("cache")).unwrap();
        std::fs::write(tmp.path().join("0100000000030000"), b"file").unwrap();

        let titles: Vec<String> = list_title_dirs(tmp.path())
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(titles, vec!["0100000000010000", "0100000000020000"]);
        assert!(list_title_dirs(&tmp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_layout_paths() {
        let layout = EmulatorLayout::new("/y", "/r");
        assert_eq!(
            layout.archive_path(),
            Path::new("/r/bis/system/save/8000000000000000/0/imkvdb.arc")
        );
        assert_eq!(
            layout.ryujinx_title_dir(SaveDirId::new(0x2a)),
            Path::new("/r/bis/user/save/000000000000002a/0")
        );
        let root = layout.yuzu_save_root("ABC");
        assert_eq!(root, Path::new("/y/nand/user/save/0000000000000000/ABC"));
        assert_eq!(
            EmulatorLayout::yuzu_title_dir(&root, "0100abcd12340000".parse().unwrap()),
            Path::new("/y/nand/user/save/0000000000000000/ABC/0100ABCD12340000")
        );
    }
}
