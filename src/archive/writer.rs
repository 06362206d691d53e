//! Atomic replacement of the archive file.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::archive::reader::Archive;
use crate::error::{Result, ToolError};

/// Write `archive` to a temporary file next to `path`, then rename it over `path`.
///
/// Readers see either the old or the new archive, never a partial write.
/// The original file's permissions are carried over.
pub fn replace_archive(path: &Path, archive: &Archive) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path)
        .map_err(|e| ToolError::open(path, e))?
        .permissions();

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ToolError::io(dir, e))?;
    tmp.write_all(&archive.to_bytes())
        .map_err(|e| ToolError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| ToolError::io(tmp.path(), e))?;
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(|e| ToolError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ToolError::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| ToolError::io(path, e.error))?;
    debug!(path = %path.display(), entries = archive.entries.len(), "Archive replaced");
    Ok(())
}
