//! Finding content packages and extracting their metadata in bulk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::content::extractor::MetadataExtractor;
use crate::error::{Result, ToolError};
use crate::model::content::ContentMeta;
use crate::model::title::TitleId;

/// File extension of content packages.
pub const PACKAGE_EXT: &str = "nsp";

/// A package the extractor could not handle.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Packages that were read, and those that were skipped.
#[derive(Debug, Default)]
pub struct ExtractedContent {
    pub packages: Vec<(PathBuf, ContentMeta)>,
    pub failures: Vec<ExtractionFailure>,
}

/// All `*.nsp` files below `dir`, sorted by path.
pub fn find_packages(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ToolError::MissingPrerequisite(dir.to_path_buf()));
    }
    let mut packages = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            ToolError::io(path, e.into())
        })?;
        let is_package = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXT));
        if entry.file_type().is_file() && is_package {
            packages.push(entry.into_path());
        }
    }
    packages.sort();
    Ok(packages)
}

/// Run the extractor on every package.
///
/// A failing package is logged and recorded, then skipped. The progress
/// callback receives `(done, total, path)`.
pub fn extract_all(
    packages: &[PathBuf],
    extractor: &dyn MetadataExtractor,
    progress: &dyn Fn(usize, usize, &Path),
) -> ExtractedContent {
    let mut content = ExtractedContent::default();
    let total = packages.len();
    for (i, path) in packages.iter().enumerate() {
        progress(i, total, path);
        match extractor.extract(path) {
            Ok(meta) => content.packages.push((path.clone(), meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping package");
                content.failures.push(ExtractionFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    progress(total, total, Path::new(""));
    content
}

/// Names titles in reports after the content files that mention them.
#[derive(Debug, Clone, Default)]
pub struct TitleLabeler {
    names: Vec<String>,
}

impl TitleLabeler {
    /// Use the entry names directly inside `dir`. A missing dir gives no names.
    pub fn from_dir(dir: Option<&Path>) -> Self {
        let names = dir
            .and_then(|d| std::fs::read_dir(d).ok())
            .map(|rd| {
                let mut names: Vec<String> = rd
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            })
            .unwrap_or_default();
        Self { names }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    /// First name containing the title id (any case), else the id itself.
    pub fn label(&self, title: TitleId) -> String {
        let needle = title.to_string();
        self.names
            .iter()
            .find(|n| n.to_ascii_lowercase().contains(&needle))
            .cloned()
            .unwrap_or(needle)
    }
}
