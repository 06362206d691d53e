//! Ryujinx update and DLC registry (`games/<app>/updates.json`, `dlc.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, ToolError};
use crate::model::content::{ContentCategory, ContentMeta};
use crate::model::title::TitleId;

/// Contents of `updates.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateRegistry {
    /// The update Ryujinx applies; the last one registered.
    pub selected: Option<String>,
    pub paths: Vec<String>,
}

/// One entry of `dlc.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DlcPackage {
    pub path: String,
    pub dlc_nca_list: Vec<DlcNca>,
}

/// A content archive inside a DLC package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DlcNca {
    pub path: String,
    pub title_id: u64,
    pub is_enabled: bool,
}

/// Counts of files written by [`RegistryBuilder::write`].
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub update_files: Vec<PathBuf>,
    pub dlc_files: Vec<PathBuf>,
}

/// Groups packages by application before writing the registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    updates: BTreeMap<TitleId, UpdateRegistry>,
    dlc: BTreeMap<TitleId, Vec<DlcPackage>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package. Returns `false` for base games, which are ignored.
    pub fn add(&mut self, package: &Path, meta: &ContentMeta) -> bool {
        let path = package.to_string_lossy().into_owned();
        let app = meta.owning_application();
        match meta.category {
            ContentCategory::Application => false,
            ContentCategory::Patch => {
                let entry = self.updates.entry(app).or_default();
                entry.selected = Some(path.clone());
                entry.paths.push(path);
                true
            }
            ContentCategory::AddOnContent => {
                let content_id = meta.content_id.as_deref().unwrap_or_default();
                self.dlc.entry(app).or_default().push(DlcPackage {
                    path,
                    dlc_nca_list: vec![DlcNca {
                        path: format!("/{content_id}.nca"),
                        title_id: meta.title_id.raw(),
                        is_enabled: true,
                    }],
                });
                true
            }
        }
    }

    pub fn updates(&self) -> &BTreeMap<TitleId, UpdateRegistry> {
        &self.updates
    }

    pub fn dlc(&self) -> &BTreeMap<TitleId, Vec<DlcPackage>> {
        &self.dlc
    }

    /// Write every registry file under `games_dir/<application id>/`.
    ///
    /// The progress callback receives `(done, total)`.
    pub fn write(&self, games_dir: &Path, progress: &dyn Fn(usize, usize)) -> Result<RegistryStats> {
        let total = self.updates.len() + self.dlc.len();
        let mut done = 0;
        let mut stats = RegistryStats::default();

        for (app, registry) in &self.updates {
            stats
                .update_files
                .push(write_json(games_dir, *app, "updates.json", registry)?);
            done += 1;
            progress(done, total);
        }
        for (app, packages) in &self.dlc {
            stats
                .dlc_files
                .push(write_json(games_dir, *app, "dlc.json", packages)?);
            done += 1;
            progress(done, total);
        }

        info!(
            updates = stats.update_files.len(),
            dlc = stats.dlc_files.len(),
            "Registry written"
        );
        Ok(stats)
    }
}

fn write_json<T: Serialize + ?Sized>(
    games_dir: &Path,
    app: TitleId,
    file_name: &str,
    value: &T,
) -> Result<PathBuf> {
    let dir = games_dir.join(app.to_string());
    std::fs::create_dir_all(&dir).map_err(|e| ToolError::io(&dir, e))?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value).map_err(|e| ToolError::Export(e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| ToolError::io(&path, e))?;
    debug!(path = %path.display(), "Wrote registry file");
    Ok(path)
}
