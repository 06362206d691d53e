//! Keeping the yuzu and Ryujinx save trees consistent.

pub mod engine;
pub mod layout;
pub mod policy;
pub mod tree;

use tracing::{info, warn};

use crate::archive::appender::ArchiveAppender;
use crate::archive::SaveArchive;
use crate::error::{Result, ToolError};
use crate::model::title::TitleId;
use crate::sync::engine::{SyncPolicyEngine, SyncReport, SyncSettings, TitlePair};
use crate::sync::layout::{list_title_dirs, read_profile_id, EmulatorLayout};

/// Run a full save sync.
///
/// 1. Resolve the active yuzu profile and read the Ryujinx save archive.
/// 2. If enabled, add archive entries for yuzu titles Ryujinx does not know,
///    sort the archive and read it again. In simulate mode the entries are
///    only planned.
/// 3. Decide and carry out the copy for every mapped title.
///
/// Missing prerequisites and a corrupt archive abort before anything is
/// written. Per-title copy failures are collected in the report.
pub fn sync_saves(
    layout: &EmulatorLayout,
    settings: SyncSettings,
    backup_retention: usize,
    label: &dyn Fn(TitleId) -> String,
    progress: Option<&dyn Fn(usize, usize, &str) -> bool>,
) -> Result<SyncReport> {
    let archive_path = layout.archive_path();
    if !archive_path.is_file() {
        return Err(ToolError::MissingPrerequisite(archive_path));
    }
    let profile = read_profile_id(&layout.profile_store_path())?;
    let yuzu_root = layout.yuzu_save_root(&profile);

    let mut archive = SaveArchive::new(archive_path, backup_retention);
    let mut index = archive.read()?.save_index();

    let mut synthesized = Vec::new();
    let mut archive_backups = Vec::new();
    if settings.synthesize_entries {
        let candidates = list_title_dirs(&yuzu_root)?;
        if settings.simulate {
            synthesized = ArchiveAppender::plan(&index, &candidates);
        } else {
            let appended = archive.append(&candidates)?;
            let sorted = archive.sort()?;
            index = archive.read()?.save_index();
            synthesized = appended.added;
            archive_backups.extend(appended.backup);
            archive_backups.extend(sorted.backup);
        }
        info!(count = synthesized.len(), "Archive entries for new titles");
    }

    let mut mapping = index.mapping.clone();
    if settings.simulate {
        for planned in &synthesized {
            mapping.insert(planned.title_id, planned.save_dir_id);
        }
    }
    if mapping.is_empty() {
        warn!("Save archive maps no titles");
    }

    let pairs: Vec<TitlePair> = mapping
        .into_iter()
        .map(|(title_id, save_dir)| TitlePair {
            title_id,
            label: label(title_id),
            a_dir: EmulatorLayout::yuzu_title_dir(&yuzu_root, title_id),
            b_dir: layout.ryujinx_title_dir(save_dir),
        })
        .collect();

    let mut engine = SyncPolicyEngine::new(settings);
    let mut report = engine.run(&pairs, progress);
    report.synthesized = synthesized;
    report.archive_backups = archive_backups;
    Ok(report)
}
