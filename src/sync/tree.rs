//! Scanning and copying save trees.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, ToolError};
use crate::sync::policy::TreeState;

/// Files and bytes written by a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Scans save trees, remembering results for the rest of the run.
///
/// A tree is walked at most once unless it is invalidated after being
/// written to.
#[derive(Debug, Default)]
pub struct TreeScanner {
    cache: HashMap<PathBuf, TreeState>,
}

impl TreeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, root: &Path) -> Result<TreeState> {
        if let Some(state) = self.cache.get(root) {
            return Ok(*state);
        }
        let state = scan_tree(root)?;
        self.cache.insert(root.to_path_buf(), state);
        Ok(state)
    }

    /// Forget a cached scan.
    pub fn invalidate(&mut self, root: &Path) {
        self.cache.remove(root);
    }
}

/// Count files below `root` and find the newest modification time.
pub fn scan_tree(root: &Path) -> Result<TreeState> {
    if !root.is_dir() {
        return Ok(TreeState::missing());
    }

    let mut state = TreeState::empty();
    for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| walk_error(entry.path(), e))?
            .modified()
            .map_err(|e| ToolError::io(entry.path(), e))?;
        state.file_count += 1;
        state.newest = Some(state.newest.map_or(modified, |n| n.max(modified)));
    }
    debug!(
        path = %root.display(),
        files = state.file_count,
        "Scanned save tree"
    );
    Ok(state)
}

/// Recursively copy `src` into `dst`.
///
/// Files present in both are overwritten, files only in `dst` are kept.
/// Copied files keep the source modification time.
pub fn merge_tree(src: &Path, dst: &Path) -> Result<CopyStats> {
    std::fs::create_dir_all(dst).map_err(|e| ToolError::io(dst, e))?;

    let mut stats = CopyStats::default();
    for entry in WalkDir::new(src).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let rel_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ToolError::io(entry.path(), std::io::Error::other(e)))?;
        let target = dst.join(rel_path);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ToolError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
        }
        let bytes = std::fs::copy(entry.path(), &target).map_err(|e| ToolError::io(&target, e))?;
        let modified = entry
            .metadata()
            .map_err(|e| walk_error(entry.path(), e))?
            .modified()
            .map_err(|e| ToolError::io(entry.path(), e))?;
        File::options()
            .write(true)
            .open(&target)
            .and_then(|f| f.set_modified(modified))
            .map_err(|e| ToolError::io(&target, e))?;

        stats.files += 1;
        stats.bytes += bytes;
    }
    Ok(stats)
}

fn walk_error(path: &Path, err: walkdir::Error) -> ToolError {
    let path = err.path().unwrap_or(path).to_path_buf();
    ToolError::io(path, err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn set_mtime(path: &Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_scan_missing_and_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(scan_tree(&tmp.path().join("nope")).unwrap(), TreeState::missing());

        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let state = scan_tree(tmp.path()).unwrap();
        assert!(state.exists);
        assert!(state.is_empty());
        assert_eq!(state.newest, None);
    }

    #[test]
    fn test_scan_finds_newest_nested_file() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("old.bin"), b"1").unwrap();
        std::fs::write(nested.join("new.bin"), b"2").unwrap();
        set_mtime(&tmp.path().join("old.bin"), 1_000);
        set_mtime(&nested.join("new.bin"), 2_000);

        let state = scan_tree(tmp.path()).unwrap();
        assert_eq!(state.file_count, 2);
        assert_eq!(state.newest, Some(UNIX_EPOCH + Duration::from_secs(2_000)));
    }

    #[test]
    fn test_scanner_caches_until_invalidated() {
        let tmp = tempfile::tempdir().unwrap();
        let mut scanner = TreeScanner::new();
        assert!(scanner.scan(tmp.path()).unwrap().is_empty());

        std::fs::write(tmp.path().join("save.bin"), b"x").unwrap();
        assert!(scanner.scan(tmp.path()).unwrap().is_empty());

        scanner.invalidate(tmp.path());
        assert_eq!(scanner.scan(tmp.path()).unwrap().file_count, 1);
    }

    #[test]
    fn test_merge_overwrites_and_preserves() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(src.join("slot")).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(src.join("slot").join("data.bin"), b"new").unwrap();
        std::fs::write(src.join("meta"), b"m").unwrap();
        set_mtime(&src.join("meta"), 5_000);
        std::fs::create_dir_all(dst.join("slot")).unwrap();
        std::fs::write(dst.join("slot").join("data.bin"), b"old contents").unwrap();
        std::fs::write(dst.join("only_here"), b"keep").unwrap();

        let stats = merge_tree(&src, &dst).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 4);
        assert_eq!(std::fs::read(dst.join("slot").join("data.bin")).unwrap(), b"new");
        assert_eq!(std::fs::read(dst.join("only_here")).unwrap(), b"keep");
        let copied_mtime = std::fs::metadata(dst.join("meta")).unwrap().modified().unwrap();
        assert_eq!(copied_mtime, UNIX_EPOCH + Duration::from_secs(5_000));
    }
}
