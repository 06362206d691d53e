//! Per-title save synchronization.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::appender::PlannedEntry;
use crate::error::{Result, ToolError};
use crate::model::title::TitleId;
use crate::sync::policy::{self, Decision, Direction, PriorityMode, Side};
use crate::sync::tree::{self, CopyStats, TreeScanner};

/// Settings for one sync run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub priority: PriorityMode,
    /// Report decisions without touching any file.
    pub simulate: bool,
    /// Add archive entries for yuzu titles Ryujinx does not know yet.
    pub synthesize_entries: bool,
    /// Root for copies of save trees taken before they are overwritten.
    pub backup_dir: PathBuf,
}

/// The two save trees of one title.
#[derive(Debug, Clone)]
pub struct TitlePair {
    pub title_id: TitleId,
    /// Human-readable name for reports.
    pub label: String,
    /// Tree A (yuzu).
    pub a_dir: PathBuf,
    /// Tree B (Ryujinx).
    pub b_dir: PathBuf,
}

impl TitlePair {
    pub fn dir(&self, side: Side) -> &Path {
        match side {
            Side::A => &self.a_dir,
            Side::B => &self.b_dir,
        }
    }
}

/// What happened to one title.
#[derive(Debug, Clone, Serialize)]
pub struct TitleOutcome {
    pub title_id: TitleId,
    pub label: String,
    pub decision: Decision,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    /// Copy of the destination taken before merging.
    pub backup: Option<PathBuf>,
    /// Files written into the destination; `None` when nothing was copied.
    pub copied: Option<CopyStats>,
    /// A copy was decided but the source tree does not exist, so it was skipped.
    pub source_missing: bool,
}

impl TitleOutcome {
    /// Whether the decision leads to an actual copy.
    pub fn copies(&self) -> bool {
        self.decision.direction.is_some() && !self.source_missing
    }
}

/// A title whose sync failed; the run continued with the others.
#[derive(Debug, Clone, Serialize)]
pub struct TitleFailure {
    pub title_id: TitleId,
    pub label: String,
    pub decision: Option<Decision>,
    pub error: String,
}

/// Consolidated result of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub simulated: bool,
    pub priority: Option<PriorityMode>,
    /// Archive entries added (or, when simulating, that would be added).
    pub synthesized: Vec<PlannedEntry>,
    /// Archive backups taken before adding entries and before sorting.
    pub archive_backups: Vec<PathBuf>,
    pub outcomes: Vec<TitleOutcome>,
    pub failures: Vec<TitleFailure>,
    /// The run was stopped before every title was processed.
    pub cancelled: bool,
}

impl SyncReport {
    /// Number of titles whose saves were (or, when simulating, would be) copied.
    pub fn copy_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                if self.simulated {
                    o.copies()
                } else {
                    o.copied.is_some()
                }
            })
            .count()
    }
}

/// Decides and carries out the sync of each title.
#[derive(Debug)]
pub struct SyncPolicyEngine {
    settings: SyncSettings,
    scanner: TreeScanner,
    run_stamp: i64,
}

impl SyncPolicyEngine {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            scanner: TreeScanner::new(),
            run_stamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Folder that holds this run's save-tree backups.
    pub fn run_backup_dir(&self) -> PathBuf {
        self.settings.backup_dir.join(self.run_stamp.to_string())
    }

    /// Scan both trees and decide, without copying.
    pub fn decide(&mut self, pair: &TitlePair) -> Result<Decision> {
        let a = self.scanner.scan(&pair.a_dir)?;
        let b = self.scanner.scan(&pair.b_dir)?;
        Ok(policy::decide(self.settings.priority, &a, &b))
    }

    /// Decide and, unless simulating, copy one title's saves.
    pub fn sync_title(&mut self, pair: &TitlePair) -> Result<TitleOutcome> {
        let decision = self.decide(pair)?;
        let mut outcome = TitleOutcome {
            title_id: pair.title_id,
            label: pair.label.clone(),
            decision,
            source: None,
            destination: None,
            backup: None,
            copied: None,
            source_missing: false,
        };

        let Some(direction) = decision.direction else {
            debug!(title = %pair.title_id, reason = %decision.reason, "Nothing to copy");
            return Ok(outcome);
        };
        let src = pair.dir(direction.source()).to_path_buf();
        let dst = pair.dir(direction.destination()).to_path_buf();
        outcome.source = Some(src.clone());
        outcome.destination = Some(dst.clone());

        if !src.is_dir() {
            warn!(
                title = %pair.title_id,
                path = %src.display(),
                "Source save folder does not exist; nothing copied"
            );
            outcome.source_missing = true;
            return Ok(outcome);
        }

        if self.settings.simulate {
            return Ok(outcome);
        }

        outcome.backup = self
            .back_up_destination(pair, direction)
            .map_err(|e| copy_failure(pair.title_id, e))?;
        let stats = tree::merge_tree(&src, &dst).map_err(|e| copy_failure(pair.title_id, e))?;
        self.scanner.invalidate(&dst);
        info!(
            title = %pair.title_id,
            reason = %decision.reason,
            from = %src.display(),
            to = %dst.display(),
            files = stats.files,
            "Synced save"
        );
        outcome.copied = Some(stats);
        Ok(outcome)
    }

    /// Sync every pair, collecting failures instead of stopping at the first.
    ///
    /// `progress` is called after each title with `(done, total, label)`;
    /// returning `false` stops before the next title.
    pub fn run(
        &mut self,
        pairs: &[TitlePair],
        progress: Option<&dyn Fn(usize, usize, &str) -> bool>,
    ) -> SyncReport {
        let mut report = SyncReport {
            simulated: self.settings.simulate,
            priority: Some(self.settings.priority),
            ..SyncReport::default()
        };

        let total = pairs.len();
        for (i, pair) in pairs.iter().enumerate() {
            match self.sync_title(pair) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(title = %pair.title_id, error = %e, "Save sync failed");
                    report.failures.push(TitleFailure {
                        title_id: pair.title_id,
                        label: pair.label.clone(),
                        decision: self.decide(pair).ok(),
                        error: e.to_string(),
                    });
                }
            }

            if let Some(cb) = progress {
                if !cb(i + 1, total, &pair.label) && i + 1 < total {
                    info!(done = i + 1, total, "Sync cancelled");
                    report.cancelled = true;
                    break;
                }
            }
        }
        report
    }

    /// Copy the destination tree into this run's backup folder.
    fn back_up_destination(&self, pair: &TitlePair, direction: Direction) -> Result<Option<PathBuf>> {
        let side = direction.destination();
        let dst = pair.dir(side);
        if !dst.is_dir() {
            return Ok(None);
        }
        let backup = self
            .run_backup_dir()
            .join(side.emulator())
            .join(pair.title_id.to_upper_hex());
        tree::merge_tree(dst, &backup)?;
        debug!(backup = %backup.display(), "Backed up save before overwrite");
        Ok(Some(backup))
    }
}

/// Re-tag an I/O error from a backup or merge as a per-title copy failure.
fn copy_failure(title: TitleId, err: ToolError) -> ToolError {
    match err {
        ToolError::Io { path, source } => ToolError::SyncCopy {
            title: title.to_string(),
            path,
            source,
        },
        other => other,
    }
}
